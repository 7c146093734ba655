//! File-backed journal.

use crate::error::JournalResult;
use crate::frame::{decode_frames, encode_frame};
use crate::journal::Journal;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// A journal stored in a single file.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push frames to the OS
/// - `sync()` calls `File::sync_all()` to ensure frames are on disk
///
/// A torn trailing frame left by a crash is cut off when the file is opened,
/// so new frames are never appended after garbage.
///
/// # Example
///
/// ```no_run
/// use tessera_journal::{FileJournal, Journal};
/// use std::path::Path;
///
/// let mut journal = FileJournal::open(Path::new("journal.log")).unwrap();
/// journal.append(b"commit").unwrap();
/// journal.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
    size: Mutex<u64>,
}

impl FileJournal {
    /// Opens or creates a journal file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, read, or repaired, or
    /// if a complete frame is corrupted.
    pub fn open(path: &Path) -> JournalResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let decoded = decode_frames(&data)?;

        let total = data.len() as u64;
        if decoded.has_torn_tail(total) {
            warn!(
                path = %path.display(),
                size = total,
                valid = decoded.valid_len,
                "truncating torn journal tail"
            );
            file.set_len(decoded.valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size: Mutex::new(decoded.valid_len),
        })
    }

    /// Opens or creates a journal file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> JournalResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn append(&mut self, payload: &[u8]) -> JournalResult<u64> {
        let frame = encode_frame(payload)?;
        let mut file = self.file.lock();
        let mut size = self.size.lock();

        let offset = *size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&frame)?;
        *size += frame.len() as u64;

        Ok(offset)
    }

    fn replay(&self) -> JournalResult<Vec<Vec<u8>>> {
        let mut file = self.file.lock();
        let size = *self.size.lock();

        let mut data = vec![0u8; size as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut data)?;

        Ok(decode_frames(&data)?.payloads)
    }

    fn flush(&mut self) -> JournalResult<()> {
        self.file.lock().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> JournalResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn reset(&mut self) -> JournalResult<()> {
        let file = self.file.lock();
        let mut size = self.size.lock();
        file.set_len(0)?;
        file.sync_all()?;
        *size = 0;
        Ok(())
    }

    fn size(&self) -> JournalResult<u64> {
        Ok(*self.size.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(journal.path(), path);
    }

    #[test]
    fn frames_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut journal = FileJournal::open(&path).unwrap();
            journal.append(b"one").unwrap();
            journal.append(b"two").unwrap();
            journal.sync().unwrap();
        }

        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(
            journal.replay().unwrap(),
            vec![b"one".to_vec(), b"two".to_vec()]
        );
    }

    #[test]
    fn open_truncates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut journal = FileJournal::open(&path).unwrap();
            journal.append(b"kept").unwrap();
            journal.sync().unwrap();
        }
        {
            let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(b"TJNL\xff\x00").unwrap();
        }

        let mut journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.size().unwrap(), 16);
        journal.append(b"next").unwrap();
        assert_eq!(
            journal.replay().unwrap(),
            vec![b"kept".to_vec(), b"next".to_vec()]
        );
    }

    #[test]
    fn reset_truncates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        let mut journal = FileJournal::open(&path).unwrap();
        journal.append(b"data").unwrap();
        journal.reset().unwrap();

        assert_eq!(journal.size().unwrap(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.log");

        let journal = FileJournal::open_with_create_dirs(&path).unwrap();
        assert_eq!(journal.size().unwrap(), 0);
    }
}
