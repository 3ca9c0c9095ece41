//! Error types for archive opening, extraction and job outcomes.

use std::path::PathBuf;
use thiserror::Error;

/// Outcome of a single open attempt against an archive container.
///
/// `BadPassword` is the only variant the password cracker retries on; every
/// other variant ends the candidate sequence immediately.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The container rejected the supplied password (or required one when
    /// none was supplied).
    #[error("Password rejected")]
    BadPassword,

    /// The archive is corrupted or malformed.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// The container format is not supported.
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    /// An I/O error occurred while reading the container.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of an extraction pass over an opened archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The sink asked to stop, or the run was aborted.
    #[error("Extraction stopped")]
    Stopped,

    /// The container reported a failure mid-extraction.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An I/O error occurred while writing an entry.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal failure of one job. Job-scoped and never fatal to the run: the
/// scheduler records the message and moves on to the next pending job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The archive file was missing before the job started.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Every candidate password was tried without success.
    #[error("No password matched after {attempts} attempts")]
    PasswordExhausted {
        /// Number of candidates tried, not counting the implicit
        /// no-password attempt.
        attempts: usize,
    },

    /// The container could not be opened for a reason other than a wrong
    /// password.
    #[error("Cannot open archive: {0}")]
    ArchiveOpen(#[source] OpenError),

    /// An I/O error occurred while writing extracted entries.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] std::io::Error),

    /// The worker observed a stop request before finishing.
    #[error("Stopped before completion")]
    Stopped,

    /// Any other failure, surfaced as its message.
    #[error("{0}")]
    Other(String),
}
