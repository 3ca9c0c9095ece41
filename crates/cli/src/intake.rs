//! Archive intake: flatten files and directories into a unique job list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use unlockit::archive::{is_secondary_volume, ArchiveKind};
use unlockit::job::Job;
use walkdir::WalkDir;

/// Collect jobs from the given paths, in the order they were named.
///
/// Directories are walked recursively. Only recognized container names are
/// kept, secondary volumes of a multi-part set are collapsed onto their
/// first volume, and duplicates are dropped.
pub fn collect_jobs(paths: &[PathBuf]) -> Vec<Job> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        consider(entry.path(), &mut seen, &mut jobs);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("skipping unreadable entry: {e}"),
                }
            }
        } else {
            consider(path, &mut seen, &mut jobs);
        }
    }

    jobs
}

fn consider(path: &Path, seen: &mut HashSet<PathBuf>, jobs: &mut Vec<Job>) {
    let Some(kind) = ArchiveKind::from_path(path) else {
        return;
    };
    if is_secondary_volume(path) {
        return;
    }

    // Missing files stay on the list; the scheduler reports them as errors.
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(resolved.clone()) {
        return;
    }

    let size = std::fs::metadata(&resolved).map(|m| m.len()).unwrap_or(0);
    jobs.push(Job::new(resolved, kind, size));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"stub").unwrap();
    }

    #[test]
    fn test_directory_walk_filters_and_collapses() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a.zip"));
        touch(&tmp.path().join("b.rar"));
        touch(&tmp.path().join("b.r00"));
        touch(&tmp.path().join("notes.txt"));
        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        touch(&sub.join("d.part1.rar"));
        touch(&sub.join("d.part2.rar"));

        let jobs = collect_jobs(&[tmp.path().to_path_buf()]);
        let names: Vec<String> = jobs
            .iter()
            .map(|j| j.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.zip", "b.rar", "d.part1.rar"]);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("a.zip");
        touch(&archive);

        let jobs = collect_jobs(&[archive.clone(), archive.clone()]);
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_missing_file_is_kept_for_error_reporting() {
        let tmp = TempDir::new().unwrap();
        let ghost = tmp.path().join("ghost.zip");

        let jobs = collect_jobs(&[ghost.clone()]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].size_bytes, 0);
    }

    #[test]
    fn test_kind_detection() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("a.zip");
        let rar = tmp.path().join("b.rar");
        touch(&zip);
        touch(&rar);

        let jobs = collect_jobs(&[zip, rar]);
        assert_eq!(jobs[0].kind, ArchiveKind::Zip);
        assert_eq!(jobs[1].kind, ArchiveKind::Rar);
    }
}
