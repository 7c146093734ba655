//! In-memory journal.

use crate::error::JournalResult;
use crate::frame::{decode_frames, encode_frame};
use crate::journal::Journal;
use parking_lot::RwLock;

/// A journal held entirely in memory.
///
/// Used for `memory` connections and for tests. Frames are lost when the
/// journal is dropped.
///
/// # Example
///
/// ```rust
/// use tessera_journal::{Journal, MemoryJournal};
///
/// let mut journal = MemoryJournal::new();
/// assert_eq!(journal.append(b"x").unwrap(), 0);
/// assert_eq!(journal.replay().unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryJournal {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal over existing raw bytes.
    ///
    /// Useful for simulating torn writes and corruption in tests.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Returns a copy of the raw journal bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl Journal for MemoryJournal {
    fn append(&mut self, payload: &[u8]) -> JournalResult<u64> {
        let frame = encode_frame(payload)?;
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(&frame);
        Ok(offset)
    }

    fn replay(&self) -> JournalResult<Vec<Vec<u8>>> {
        Ok(decode_frames(&self.bytes.read())?.payloads)
    }

    fn flush(&mut self) -> JournalResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> JournalResult<()> {
        Ok(())
    }

    fn reset(&mut self) -> JournalResult<()> {
        self.bytes.write().clear();
        Ok(())
    }

    fn size(&self) -> JournalResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_journal_is_empty() {
        let journal = MemoryJournal::new();
        assert_eq!(journal.size().unwrap(), 0);
        assert!(journal.replay().unwrap().is_empty());
    }

    #[test]
    fn append_returns_frame_offsets() {
        let mut journal = MemoryJournal::new();
        let first = journal.append(b"hello").unwrap();
        let second = journal.append(b"world").unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 17);
        assert_eq!(journal.size().unwrap(), 34);
    }

    #[test]
    fn replay_preserves_order() {
        let mut journal = MemoryJournal::new();
        for i in 0..5u8 {
            journal.append(&[i]).unwrap();
        }

        let frames = journal.replay().unwrap();
        assert_eq!(frames, (0..5u8).map(|i| vec![i]).collect::<Vec<_>>());
    }

    #[test]
    fn replay_skips_torn_tail() {
        let mut journal = MemoryJournal::new();
        journal.append(b"complete").unwrap();
        let mut bytes = journal.bytes();
        bytes.extend_from_slice(b"TJNL\x10");

        let torn = MemoryJournal::with_bytes(bytes);
        assert_eq!(torn.replay().unwrap(), vec![b"complete".to_vec()]);
    }

    #[test]
    fn reset_discards_frames() {
        let mut journal = MemoryJournal::new();
        journal.append(b"gone").unwrap();
        journal.reset().unwrap();

        assert_eq!(journal.size().unwrap(), 0);
        assert!(journal.replay().unwrap().is_empty());
    }
}
