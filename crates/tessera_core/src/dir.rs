//! Data directory management.
//!
//! Directory-backed connections use this layout:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK          # Advisory lock: one connection per directory
//! └─ journal.log   # Commit journal replayed on connect
//! ```

use crate::error::{AdapterError, AdapterResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// A locked data directory.
///
/// The lock is held for as long as the value lives; dropping it releases the
/// directory for the next connection.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    lock_file: File,
}

impl DataDir {
    /// Opens a data directory and takes its exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory
    /// - Another connection holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> AdapterResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(AdapterError::connection(format!(
                    "data directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(AdapterError::connection(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(AdapterError::connection(format!(
                "data directory is locked by another connection: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the commit journal.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns `Teardown` if the lock cannot be released.
    pub fn release(self) -> AdapterResult<()> {
        FileExt::unlock(&self.lock_file).map_err(|e| {
            AdapterError::teardown(format!(
                "failed to unlock {}: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("data");

        let dir = DataDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.journal_path(), path.join("journal.log"));
    }

    #[test]
    fn open_missing_without_create_fails() {
        let tmp = tempdir().unwrap();
        let result = DataDir::open(&tmp.path().join("missing"), false);
        assert!(matches!(result, Err(AdapterError::Connection { .. })));
    }

    #[test]
    fn second_open_is_locked_out() {
        let tmp = tempdir().unwrap();
        let _first = DataDir::open(tmp.path(), true).unwrap();

        let second = DataDir::open(tmp.path(), true);
        assert!(matches!(second, Err(AdapterError::Connection { .. })));
    }

    #[test]
    fn release_allows_reopen() {
        let tmp = tempdir().unwrap();
        let first = DataDir::open(tmp.path(), true).unwrap();
        first.release().unwrap();

        assert!(DataDir::open(tmp.path(), true).is_ok());
    }
}
