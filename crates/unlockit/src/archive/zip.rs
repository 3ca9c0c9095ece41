//! ZIP container backend on the `zip` crate.

use crate::archive::{Archive, ArchiveEntry, ExtractPlan, ExtractSink, Verdict};
use crate::error::{ExtractError, OpenError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::result::ZipError;

/// ZIP archive opened from the filesystem.
///
/// `try_open` validates the password by fully reading the first encrypted
/// entry; a wrong ZipCrypto password usually only surfaces as a checksum
/// failure on read, AES rejects up front.
pub struct ZipBackend {
    path: PathBuf,
    password: Option<String>,
    entries: Vec<ArchiveEntry>,
    encrypted: Vec<bool>,
}

impl ZipBackend {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            password: None,
            entries: Vec::new(),
            encrypted: Vec::new(),
        }
    }

    fn open_container(&self) -> Result<zip::ZipArchive<File>, OpenError> {
        let file = File::open(&self.path)?;
        zip::ZipArchive::new(file).map_err(map_zip_error)
    }
}

fn map_zip_error(e: ZipError) -> OpenError {
    match e {
        ZipError::Io(io) => OpenError::Io(io),
        ZipError::InvalidPassword => OpenError::BadPassword,
        ZipError::UnsupportedArchive(msg) if msg.to_lowercase().contains("password") => {
            OpenError::BadPassword
        }
        ZipError::UnsupportedArchive(msg) => OpenError::Unsupported(msg.to_string()),
        other => OpenError::Corrupted(other.to_string()),
    }
}

impl Archive for ZipBackend {
    fn try_open(&mut self, password: Option<&str>) -> Result<(), OpenError> {
        let mut container = self.open_container()?;

        let mut entries = Vec::with_capacity(container.len());
        let mut encrypted = Vec::with_capacity(container.len());
        let mut first_encrypted = None;

        for i in 0..container.len() {
            // by_index_raw reads metadata only, so encrypted entries are
            // visible without a password.
            let entry = container.by_index_raw(i).map_err(map_zip_error)?;
            if entry.encrypted() && first_encrypted.is_none() && !entry.is_dir() {
                first_encrypted = Some(i);
            }
            encrypted.push(entry.encrypted());
            entries.push(ArchiveEntry {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
            });
        }

        if let Some(i) = first_encrypted {
            let pw = password.ok_or(OpenError::BadPassword)?;
            let mut entry = container
                .by_index_decrypt(i, pw.as_bytes())
                .map_err(map_zip_error)?;
            // Force the decompression to the end so the checksum is checked.
            io::copy(&mut entry, &mut io::sink()).map_err(|e| {
                debug!(entry = i, "checksum failed during password validation: {e}");
                OpenError::BadPassword
            })?;
        }

        self.password = password.map(str::to_owned);
        self.entries = entries;
        self.encrypted = encrypted;
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
        let mut container = self
            .open_container()
            .map_err(|e| ExtractError::Archive(e.to_string()))?;

        for (i, dest) in plan.iter().enumerate() {
            let Some(dest) = dest else {
                continue;
            };

            let mut entry = match (self.encrypted.get(i), &self.password) {
                (Some(true), Some(pw)) => container
                    .by_index_decrypt(i, pw.as_bytes())
                    .map_err(|e| ExtractError::Archive(e.to_string()))?,
                _ => container
                    .by_index(i)
                    .map_err(|e| ExtractError::Archive(e.to_string()))?,
            };

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(dest)?;
            io::copy(&mut entry, &mut out)?;

            let meta = &self.entries[i];
            if sink.entry_done(&meta.name, meta.size) == Verdict::Stop {
                return Err(ExtractError::Stopped);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::NullSink;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::unstable::write::FileOptionsExt;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn write_plain_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.start_file("hello.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"hello").unwrap();
        zip.start_file("sub/nested.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"nested").unwrap();
        zip.finish().unwrap();
    }

    #[allow(deprecated)]
    fn write_encrypted_zip(path: &Path, password: &str) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().with_deprecated_encryption(password.as_bytes());
        zip.start_file("secret.txt", options).unwrap();
        zip.write_all(b"classified").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_open_and_extract_plain() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("plain.zip");
        write_plain_zip(&archive_path);

        let mut backend = ZipBackend::new(&archive_path);
        backend.try_open(None).unwrap();
        assert_eq!(backend.entries().len(), 2);

        let out = tmp.path().join("out");
        let plan: ExtractPlan = backend
            .entries()
            .iter()
            .map(|e| Some(out.join(&e.name)))
            .collect();
        backend.extract(&plan, &mut NullSink).unwrap();

        assert_eq!(fs::read_to_string(out.join("hello.txt")).unwrap(), "hello");
        assert_eq!(
            fs::read_to_string(out.join("sub/nested.txt")).unwrap(),
            "nested"
        );
    }

    #[test]
    fn test_encrypted_requires_password() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("locked.zip");
        write_encrypted_zip(&archive_path, "secret");

        let mut backend = ZipBackend::new(&archive_path);
        assert!(matches!(
            backend.try_open(None),
            Err(OpenError::BadPassword)
        ));
        assert!(matches!(
            backend.try_open(Some("wrong")),
            Err(OpenError::BadPassword)
        ));
        backend.try_open(Some("secret")).unwrap();

        let out = tmp.path().join("out");
        let plan: ExtractPlan = vec![Some(out.join("secret.txt"))];
        backend.extract(&plan, &mut NullSink).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("secret.txt")).unwrap(),
            "classified"
        );
    }

    #[test]
    fn test_plan_skips_entries() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("plain.zip");
        write_plain_zip(&archive_path);

        let mut backend = ZipBackend::new(&archive_path);
        backend.try_open(None).unwrap();

        let out = tmp.path().join("out");
        let plan: ExtractPlan = vec![None, Some(out.join("nested.txt"))];
        backend.extract(&plan, &mut NullSink).unwrap();

        assert!(!out.join("hello.txt").exists());
        assert!(out.join("nested.txt").exists());
    }
}
