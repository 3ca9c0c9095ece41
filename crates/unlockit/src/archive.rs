//! The archive capability consumed by the scheduler.
//!
//! The core never touches container internals. It drives archives through the
//! [`Archive`] trait: attempt an open with a candidate password, enumerate
//! entries, hand over a per-entry destination plan and extract. Long-running
//! operations report back through an [`ExtractSink`] whose callbacks return a
//! [`Verdict`], so a worker can stop an operation cooperatively.

use crate::error::{ExtractError, OpenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod rar;
pub mod zip;

/// Container kind, as grouped by the intake layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Rar,
    Zip,
}

impl ArchiveKind {
    /// Detect the container kind from a file name.
    ///
    /// Recognizes `.zip`, `.rar`, multi-part `.partN.rar` / `.partN.zip`
    /// names and numbered RAR volumes (`.r00`, `.r01`, ...). Returns `None`
    /// for anything else.
    pub fn from_path(path: &Path) -> Option<ArchiveKind> {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("")
            .to_lowercase();

        if filename.ends_with(".zip") {
            return Some(ArchiveKind::Zip);
        }
        if filename.ends_with(".rar") {
            return Some(ArchiveKind::Rar);
        }

        // Numbered volumes: .r00, .r01, ... belong to a RAR set, .z01, ...
        // to a split ZIP.
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if extension.len() >= 2 && extension[1..].chars().all(|c| c.is_ascii_digit()) {
            if extension.starts_with('r') {
                return Some(ArchiveKind::Rar);
            }
            if extension.starts_with('z') {
                return Some(ArchiveKind::Zip);
            }
        }

        None
    }
}

/// True for volumes of a multi-part set that are not the first part.
///
/// Extraction is always driven from the first volume; secondary volumes are
/// collapsed away at intake so a dropped directory of `.part1.rar` through
/// `.part9.rar` schedules a single job.
pub fn is_secondary_volume(path: &Path) -> bool {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("")
        .to_lowercase();

    // .partN.rar / .partN.zip with N > 1
    if let Some(idx) = filename.rfind(".part") {
        let rest = &filename[idx + ".part".len()..];
        if let Some(dot) = rest.find('.') {
            if let Ok(n) = rest[..dot].parse::<u32>() {
                return n > 1;
            }
        }
    }

    // Numbered continuation volumes (.r00 follows .rar, .z01 follows .zip)
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension.len() >= 2
        && (extension.starts_with('r') || extension.starts_with('z'))
        && extension[1..].chars().all(|c| c.is_ascii_digit())
    {
        return true;
    }

    false
}

/// One file record inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the entry within the archive
    pub name: String,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Whether this entry is a directory
    pub is_dir: bool,
}

/// Continue-or-stop answer returned by sink callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Stop,
}

/// Observer for long-running archive operations.
///
/// Implementations forward the notifications to a display layer and answer
/// with [`Verdict::Stop`] once an abort has been requested.
pub trait ExtractSink {
    /// A candidate password is about to be tried.
    fn password_tried(&mut self, candidate: &str) -> Verdict;

    /// One entry finished extracting.
    fn entry_done(&mut self, name: &str, size: u64) -> Verdict;
}

/// Sink that never stops and drops all notifications. Useful for probing.
pub struct NullSink;

impl ExtractSink for NullSink {
    fn password_tried(&mut self, _candidate: &str) -> Verdict {
        Verdict::Continue
    }

    fn entry_done(&mut self, _name: &str, _size: u64) -> Verdict {
        Verdict::Continue
    }
}

/// Destination assignment for the entries of one archive, index-aligned with
/// [`Archive::entries`]. `None` skips the entry.
pub type ExtractPlan = Vec<Option<PathBuf>>;

/// An opened (or openable) archive container.
///
/// The open/enumerate/extract split mirrors how the scheduler uses it: the
/// cracker calls `try_open` repeatedly, the planner reads `entries`, and the
/// worker finally calls `extract` with every destination already fixed.
pub trait Archive: Send {
    /// Attempt to open the container with the given password.
    ///
    /// A successful open must leave `entries` populated. The password sticks
    /// for the following `extract` call.
    ///
    /// # Errors
    ///
    /// `OpenError::BadPassword` when the container rejected the password (or
    /// required one); any other variant means the container itself is
    /// unusable and further candidates are pointless.
    fn try_open(&mut self, password: Option<&str>) -> Result<(), OpenError>;

    /// Entries in archive enumeration order. Empty before a successful open.
    fn entries(&self) -> &[ArchiveEntry];

    /// Extract the planned entries sequentially, in enumeration order.
    ///
    /// Calls `sink.entry_done` after each written entry; a `Stop` verdict
    /// ends the pass with [`ExtractError::Stopped`]. Writes already committed
    /// are not rolled back.
    fn extract(
        &mut self,
        plan: &ExtractPlan,
        sink: &mut dyn ExtractSink,
    ) -> Result<(), ExtractError>;
}

/// Factory seam between the scheduler and concrete containers.
///
/// The scheduler only ever asks an opener for a boxed [`Archive`]; tests
/// substitute scripted doubles here.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, kind: ArchiveKind, path: &Path) -> Result<Box<dyn Archive>, OpenError>;
}

/// Opener for real containers on the filesystem.
pub struct FsOpener;

impl ArchiveOpener for FsOpener {
    fn open(&self, kind: ArchiveKind, path: &Path) -> Result<Box<dyn Archive>, OpenError> {
        match kind {
            ArchiveKind::Zip => Ok(Box::new(zip::ZipBackend::new(path))),
            ArchiveKind::Rar => Ok(Box::new(rar::RarBackend::new(path))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            ArchiveKind::from_path(Path::new("a/b/data.zip")),
            Some(ArchiveKind::Zip)
        );
        assert_eq!(
            ArchiveKind::from_path(Path::new("Movie.Part1.RAR")),
            Some(ArchiveKind::Rar)
        );
        assert_eq!(
            ArchiveKind::from_path(Path::new("backup.r03")),
            Some(ArchiveKind::Rar)
        );
        assert_eq!(
            ArchiveKind::from_path(Path::new("split.z01")),
            Some(ArchiveKind::Zip)
        );
        assert_eq!(ArchiveKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(ArchiveKind::from_path(Path::new("archive.tar.gz")), None);
    }

    #[test]
    fn test_secondary_volume_detection() {
        assert!(!is_secondary_volume(Path::new("movie.part1.rar")));
        assert!(is_secondary_volume(Path::new("movie.part2.rar")));
        assert!(is_secondary_volume(Path::new("movie.part10.rar")));
        assert!(is_secondary_volume(Path::new("backup.r00")));
        assert!(is_secondary_volume(Path::new("split.z01")));
        assert!(!is_secondary_volume(Path::new("plain.rar")));
        assert!(!is_secondary_volume(Path::new("plain.zip")));
    }
}
