//! Candidate-password retry loop against a single archive.

use crate::archive::{Archive, ExtractSink, Verdict};
use crate::error::OpenError;
use crate::passwords::PasswordStore;
use thiserror::Error;
use tracing::debug;

/// Successful open, with the password that worked (if any was needed) and
/// the number of candidates tried before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrackResult {
    /// `None` when the implicit no-password attempt succeeded.
    pub password: Option<String>,
    /// Candidate attempts only; the implicit try is not counted here.
    pub attempts: usize,
}

#[derive(Debug, Error)]
pub enum CrackError {
    /// Every candidate was rejected.
    #[error("Candidates exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },

    /// The sink asked to stop mid-sequence.
    #[error("Stopped before a password was found")]
    Stopped,

    /// The container failed for a reason no further candidate can fix.
    #[error(transparent)]
    Open(OpenError),
}

/// Open `archive`, cracking the password from the shared store if needed.
///
/// An implicit no-password attempt runs first, since most archives are not
/// encrypted at all. Candidates are then tried in store order; each is
/// announced through the sink before the attempt, and a `Stop` verdict
/// abandons the sequence. The first password that opens the archive is
/// recorded back into the store.
///
/// # Errors
///
/// `CrackError::Exhausted` only after the whole snapshot failed with
/// password rejections. Any other open failure (corruption, unsupported
/// container) surfaces immediately as `CrackError::Open` and is not retried.
pub fn crack(
    archive: &mut dyn Archive,
    store: &PasswordStore,
    sink: &mut dyn ExtractSink,
) -> Result<CrackResult, CrackError> {
    match archive.try_open(None) {
        Ok(()) => {
            return Ok(CrackResult {
                password: None,
                attempts: 0,
            })
        }
        Err(OpenError::BadPassword) => {}
        Err(e) => return Err(CrackError::Open(e)),
    }

    let mut attempts = 0;
    for candidate in store.snapshot() {
        if sink.password_tried(&candidate) == Verdict::Stop {
            return Err(CrackError::Stopped);
        }
        attempts += 1;
        match archive.try_open(Some(&candidate)) {
            Ok(()) => {
                debug!(attempts, "password found");
                store.record_success(&candidate);
                return Ok(CrackResult {
                    password: Some(candidate),
                    attempts,
                });
            }
            Err(OpenError::BadPassword) => continue,
            Err(e) => return Err(CrackError::Open(e)),
        }
    }

    Err(CrackError::Exhausted { attempts })
}
