//! Shared candidate password list.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

/// Ordered, duplicate-free collection of candidate passwords.
///
/// Read by every cracking worker and appended to by any worker that opens an
/// archive with a password not yet on the list. All access goes through one
/// mutex, so the no-duplicates invariant holds under concurrent successes.
#[derive(Default)]
pub struct PasswordStore {
    inner: Mutex<Vec<String>>,
}

impl PasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a newline-separated password file. Blank lines are dropped,
    /// order is preserved, duplicates collapse to their first occurrence.
    pub fn load(path: &Path) -> io::Result<Self> {
        let store = Self::new();
        let contents = fs::read_to_string(path)?;
        for line in contents.lines() {
            let line = line.trim();
            if !line.is_empty() {
                store.add(line);
            }
        }
        Ok(store)
    }

    /// Write the list back out, one password per line.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut contents = self.inner.lock().join("\n");
        contents.push('\n');
        fs::write(path, contents)
    }

    /// Insert a candidate at the end of the list. Returns false if it was
    /// already present.
    pub fn add(&self, password: &str) -> bool {
        let mut list = self.inner.lock();
        if list.iter().any(|p| p == password) {
            return false;
        }
        list.push(password.to_owned());
        true
    }

    /// Record a password that just opened an archive. Idempotent.
    pub fn record_success(&self, password: &str) {
        if self.add(password) {
            info!("recorded new working password");
        }
    }

    /// The candidates in order, as of this call. Workers crack against a
    /// snapshot; passwords recorded later are picked up by later jobs.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
