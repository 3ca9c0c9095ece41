//! Run configuration, consumed read-only by the scheduler and its workers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// How colliding destination paths are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Replace existing files
    Overwrite,

    /// Ask for every collision
    Prompt,

    /// Pick a fresh `_n` name
    #[default]
    Rename,
}

/// What happens to the archive file after a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessAction {
    #[default]
    None,

    /// Move the archive aside under a fixed name prefix
    Rename,

    /// Delete the archive
    Delete,
}

/// Which jobs stay on the list once a run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPolicy {
    #[default]
    KeepAll,
    ClearAll,
    ClearSuccessfulOnly,
}

/// Configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunConfig {
    /// Root directory extracted entries land under
    pub destination: PathBuf,

    /// Maximum number of concurrently running jobs
    pub concurrency: usize,

    /// Loose-file count at which an archive gets its own directory
    pub own_dir_threshold: usize,

    pub overwrite: OverwritePolicy,
    pub on_success: SuccessAction,
    pub when_done: ListPolicy,

    /// Case-insensitive patterns for entries that are never extracted
    pub skip_patterns: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::new(),
            concurrency: 3,
            own_dir_threshold: 10,
            overwrite: OverwritePolicy::default(),
            on_success: SuccessAction::default(),
            when_done: ListPolicy::default(),
            skip_patterns: crate::planner::DEFAULT_SKIP_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields defaults; a corrupt file logs a warning and
    /// yields defaults as well.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("failed to parse config file {}: {e}. Using defaults.", path.display());
                Self::default()
            }),
            Err(e) => {
                warn!("failed to read config file {}: {e}. Using defaults.", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.overwrite, OverwritePolicy::Rename);
        assert_eq!(config.on_success, SuccessAction::None);
        assert_eq!(config.when_done, ListPolicy::KeepAll);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"destination": "/tmp/out", "concurrency": 5}"#).unwrap();

        let config = RunConfig::load(&path);
        assert_eq!(config.destination, PathBuf::from("/tmp/out"));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.own_dir_threshold, 10);
    }

    #[test]
    fn test_load_corrupt_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let config = RunConfig::load(&path);
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = RunConfig::load(Path::new("/definitely/not/here.json"));
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn test_policy_wire_names() {
        let json = r#"{"overwrite": "prompt", "on_success": "delete", "when_done": "clear_successful_only"}"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.overwrite, OverwritePolicy::Prompt);
        assert_eq!(config.on_success, SuccessAction::Delete);
        assert_eq!(config.when_done, ListPolicy::ClearSuccessfulOnly);
    }
}
