//! Journal trait definition.

use crate::error::JournalResult;

/// An append-only log of framed payloads.
///
/// Journals do not interpret payloads. A backend appends one payload per
/// committed transaction and replays them in order when it reconnects.
///
/// # Invariants
///
/// - `append` returns the offset where the frame starts
/// - `replay` returns payloads in append order, skipping a torn final frame
/// - after `flush` returns, appended frames survive process termination
/// - journals must be `Send + Sync` so a backend can share one across threads
pub trait Journal: Send + Sync {
    /// Appends one payload as a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or an I/O error occurs.
    fn append(&mut self, payload: &[u8]) -> JournalResult<u64>;

    /// Reads every complete frame and returns their payloads.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if a complete frame fails validation.
    fn replay(&self) -> JournalResult<Vec<Vec<u8>>>;

    /// Pushes appended frames to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> JournalResult<()>;

    /// Forces appended frames and file metadata onto durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> JournalResult<()>;

    /// Discards every frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be truncated.
    fn reset(&mut self) -> JournalResult<()>;

    /// Returns the journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> JournalResult<u64>;
}
