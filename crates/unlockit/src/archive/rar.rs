//! RAR container backend on the `unrar` library.

use crate::archive::{Archive, ArchiveEntry, ExtractPlan, ExtractSink, Verdict};
use crate::error::{ExtractError, OpenError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// RAR archive opened from the filesystem.
///
/// Opening walks every header (volumes are followed automatically) and
/// test-extracts the first file entry, because archives that encrypt file
/// data but not headers only reject a wrong password at extraction time.
pub struct RarBackend {
    path: PathBuf,
    password: Option<String>,
    entries: Vec<ArchiveEntry>,
}

impl RarBackend {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            password: None,
            entries: Vec::new(),
        }
    }

    fn container<'a>(&'a self, password: Option<&'a str>) -> unrar::Archive<'a> {
        let archive = match password {
            Some(pw) => unrar::Archive::with_password(&self.path, pw.as_bytes()),
            None => unrar::Archive::new(&self.path),
        };
        // Always drive the set from its first volume.
        archive.as_first_part()
    }
}

/// Map an unrar failure onto the open-attempt vocabulary.
fn map_rar_error(e: unrar::error::UnrarError) -> OpenError {
    let msg = e.to_string();
    let lowered = msg.to_lowercase();
    if lowered.contains("password") || lowered.contains("encrypted") {
        OpenError::BadPassword
    } else if lowered.contains("corrupt") || lowered.contains("bad") || lowered.contains("crc") {
        OpenError::Corrupted(msg)
    } else {
        OpenError::Io(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }
}

/// Error mapping for the test-extraction of the probe entry. A wrong
/// password on RAR3 file data surfaces as a data/CRC failure, not as a
/// password error.
fn map_probe_error(e: unrar::error::UnrarError) -> OpenError {
    match map_rar_error(e) {
        OpenError::Corrupted(msg) => {
            debug!("treating probe failure as password rejection: {msg}");
            OpenError::BadPassword
        }
        other => other,
    }
}

impl Archive for RarBackend {
    fn try_open(&mut self, password: Option<&str>) -> Result<(), OpenError> {
        let open = self
            .container(password)
            .open_for_processing()
            .map_err(map_rar_error)?;

        // Probe target for the first file entry; dropped with the tempdir.
        let probe_dir = tempfile::tempdir()?;
        let probe_path = probe_dir.path().join("probe");

        let mut entries = Vec::new();
        let mut probed = false;
        let mut current = Some(open);

        while let Some(arch) = current {
            match arch.read_header() {
                Ok(Some(header)) => {
                    let entry = header.entry();
                    let meta = ArchiveEntry {
                        // Archives built on Windows store backslash separators.
                        name: entry.filename.to_string_lossy().replace('\\', "/"),
                        size: entry.unpacked_size as u64,
                        is_dir: entry.is_directory(),
                    };
                    current = Some(if !meta.is_dir && !probed {
                        probed = true;
                        header.extract_to(&probe_path).map_err(map_probe_error)?
                    } else {
                        header.skip().map_err(map_rar_error)?
                    });
                    entries.push(meta);
                }
                Ok(None) => current = None,
                Err(e) => return Err(map_rar_error(e)),
            }
        }

        self.password = password.map(str::to_owned);
        self.entries = entries;
        Ok(())
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn extract(
        &mut self,
        plan: &ExtractPlan,
        sink: &mut dyn ExtractSink,
    ) -> Result<(), ExtractError> {
        let open = self
            .container(self.password.as_deref())
            .open_for_processing()
            .map_err(|e| ExtractError::Archive(e.to_string()))?;

        let mut index = 0usize;
        let mut current = Some(open);

        while let Some(arch) = current {
            match arch.read_header() {
                Ok(Some(header)) => {
                    let dest = plan.get(index).cloned().flatten();
                    index += 1;

                    current = Some(match dest {
                        Some(dest) => {
                            if let Some(parent) = dest.parent() {
                                fs::create_dir_all(parent)?;
                            }
                            let next = header
                                .extract_to(&dest)
                                .map_err(|e| ExtractError::Archive(e.to_string()))?;
                            let (name, size) = match self.entries.get(index - 1) {
                                Some(meta) => (meta.name.clone(), meta.size),
                                None => (dest.display().to_string(), 0),
                            };
                            if sink.entry_done(&name, size) == Verdict::Stop {
                                return Err(ExtractError::Stopped);
                            }
                            next
                        }
                        None => header
                            .skip()
                            .map_err(|e| ExtractError::Archive(e.to_string()))?,
                    });
                }
                Ok(None) => current = None,
                Err(e) => return Err(ExtractError::Archive(e.to_string())),
            }
        }

        Ok(())
    }
}
