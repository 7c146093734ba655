//! # Tessera Journal
//!
//! Append-only commit journal used by the tessera backends.
//!
//! A journal is a sequence of **frames**. Each frame wraps an opaque payload
//! (the backend decides what a payload means) with a magic marker, a length
//! and a CRC-32 checksum:
//!
//! ```text
//! +--------+------------+-----------+-----------------+
//! | "TJNL" | len (u32)  | crc (u32) | payload (len B) |
//! +--------+------------+-----------+-----------------+
//! ```
//!
//! ## Available Journals
//!
//! - [`MemoryJournal`] - For tests and in-memory connections
//! - [`FileJournal`] - For directory-backed connections
//!
//! ## Example
//!
//! ```rust
//! use tessera_journal::{Journal, MemoryJournal};
//!
//! let mut journal = MemoryJournal::new();
//! journal.append(b"commit 1").unwrap();
//! journal.append(b"commit 2").unwrap();
//! let frames = journal.replay().unwrap();
//! assert_eq!(frames, vec![b"commit 1".to_vec(), b"commit 2".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod frame;
mod journal;
mod memory;

pub use error::{JournalError, JournalResult};
pub use file::FileJournal;
pub use frame::{
    compute_crc32, decode_frames, encode_frame, DecodedFrames, FRAME_HEADER_SIZE, FRAME_MAGIC,
};
pub use journal::Journal;
pub use memory::MemoryJournal;
