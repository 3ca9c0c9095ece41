//! Destination planning for one archive's entry list.
//!
//! Decides, once per job, whether entries extract straight under the
//! destination root or under a synthesized container directory, and which
//! entries never extract at all (junk markers, OS metadata, unsafe names).

use crate::archive::ArchiveEntry;
use regex::{Regex, RegexSet};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

/// Junk markers, OS metadata files and known irrelevant extensions that are
/// never extracted by default.
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    r"\bthumbs\.db$",
    r"\b__macosx\b",
    r"\bds_store\b",
    r"\bdxva_sig$",
    r"rapidpoint",
    r"\.(?:ion|pif|jbf)$",
];

/// Compiled skip-pattern set. Entry names matching any pattern never get a
/// destination and are never extracted.
pub struct JunkFilter {
    set: RegexSet,
}

impl JunkFilter {
    /// Compile a pattern set; matching is case-insensitive.
    pub fn new<P: AsRef<str>>(patterns: &[P]) -> Result<Self, regex::Error> {
        let wrapped: Vec<String> = patterns
            .iter()
            .map(|p| format!("(?i){}", p.as_ref()))
            .collect();
        Ok(Self {
            set: RegexSet::new(wrapped)?,
        })
    }

    /// Compile a configured set, falling back to the default set when a
    /// pattern does not parse.
    pub fn from_config(patterns: &[String]) -> Self {
        match Self::new(patterns) {
            Ok(filter) => filter,
            Err(e) => {
                warn!("invalid skip pattern, using the default set: {e}");
                Self::new(DEFAULT_SKIP_PATTERNS)
                    .unwrap_or_else(|_| Self { set: RegexSet::empty() })
            }
        }
    }

    pub fn is_junk(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

/// Filter over [`DEFAULT_SKIP_PATTERNS`].
pub fn default_junk_filter() -> &'static JunkFilter {
    static FILTER: OnceLock<JunkFilter> = OnceLock::new();
    FILTER.get_or_init(|| {
        JunkFilter::new(DEFAULT_SKIP_PATTERNS).unwrap_or_else(|_| JunkFilter {
            set: RegexSet::empty(),
        })
    })
}

/// Trailing multi-part indicator plus single-letter-coded compression
/// suffix, e.g. `.part2.rar`, `.r01`, `.zip`.
fn volume_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(?:\.part\d+)?\.[rz].{2}$").unwrap())
}

/// Container directory name derived from an archive file name:
/// `movie.part1.rar` and `movie.r01` both reduce to `movie`.
pub fn container_name(archive_file_name: &str) -> String {
    volume_suffix_pattern()
        .replace(archive_file_name, "")
        .into_owned()
}

/// Normalize an entry name into a safe relative path.
///
/// Absolute names, drive prefixes and `..` components are rejected, `.`
/// components dropped. Entries that normalize to nothing are rejected too.
pub fn safe_relative(name: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Entries that take part in planning: files that are neither junk nor
/// unsafely named.
fn kept<'a>(
    entries: &'a [ArchiveEntry],
    junk: &'a JunkFilter,
) -> impl Iterator<Item = &'a ArchiveEntry> {
    entries
        .iter()
        .filter(|e| !e.is_dir && !junk.is_junk(&e.name) && safe_relative(&e.name).is_some())
}

/// Common directory prefix of the kept entries. Empty as soon as one entry
/// sits directly at the archive root.
fn min_path(entries: &[ArchiveEntry], junk: &JunkFilter) -> PathBuf {
    let mut prefix: Option<Vec<String>> = None;
    for entry in kept(entries, junk) {
        let dir: Vec<String> = Path::new(&entry.name)
            .parent()
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        prefix = Some(match prefix {
            None => dir,
            Some(current) => {
                let shared = current
                    .iter()
                    .zip(dir.iter())
                    .take_while(|(a, b)| a == b)
                    .count();
                current[..shared].to_vec()
            }
        });
        if prefix.as_ref().is_some_and(|p| p.is_empty()) {
            break;
        }
    }
    prefix.unwrap_or_default().iter().collect()
}

/// Compute the base directory for one job.
///
/// Returns the synthesized container directory when the archive would
/// otherwise spill `threshold` or more loose files into the destination
/// root; `None` means entries keep their own relative paths.
pub fn plan_base_dir(
    entries: &[ArchiveEntry],
    threshold: usize,
    archive_file_name: &str,
    junk: &JunkFilter,
) -> Option<String> {
    let count = kept(entries, junk).count();
    if count >= threshold.max(1) && min_path(entries, junk).as_os_str().is_empty() {
        Some(container_name(archive_file_name))
    } else {
        None
    }
}
