//! Frame envelope encoding and decoding.

use crate::error::{JournalError, JournalResult};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"TJNL";

/// Size of the frame header: magic, payload length, checksum.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Payloads decoded from a byte region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrames {
    /// Payloads of every complete, valid frame, in append order.
    pub payloads: Vec<Vec<u8>>,
    /// Number of leading bytes covered by complete frames.
    ///
    /// Anything past this offset is a torn trailing frame.
    pub valid_len: u64,
}

impl DecodedFrames {
    /// Returns true if a torn trailing frame was skipped.
    #[must_use]
    pub fn has_torn_tail(&self, total_len: u64) -> bool {
        self.valid_len < total_len
    }
}

/// Wraps a payload in a frame envelope.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload length does not fit in a `u32`.
pub fn encode_frame(payload: &[u8]) -> JournalResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| JournalError::PayloadTooLarge { len: payload.len() })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&compute_crc32(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decodes every frame in `data`.
///
/// An incomplete frame at the end of the region (crash during append) stops
/// decoding without an error. A complete frame with a bad magic marker or a
/// checksum mismatch is reported as corruption.
///
/// # Errors
///
/// Returns `Corrupted` for a damaged complete frame.
pub fn decode_frames(data: &[u8]) -> JournalResult<DecodedFrames> {
    let mut payloads = Vec::new();
    let mut cursor = 0usize;

    while cursor < data.len() {
        let remaining = data.len() - cursor;
        if remaining < FRAME_HEADER_SIZE {
            break;
        }

        let header = &data[cursor..cursor + FRAME_HEADER_SIZE];
        if header[0..4] != FRAME_MAGIC {
            return Err(JournalError::corrupted(cursor as u64, "bad frame magic"));
        }

        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let stored_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        let start = cursor + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len) else {
            break;
        };
        if end > data.len() {
            break;
        }

        let payload = &data[start..end];
        let actual_crc = compute_crc32(payload);
        if actual_crc != stored_crc {
            return Err(JournalError::corrupted(
                cursor as u64,
                format!("checksum mismatch: expected {stored_crc:08x}, got {actual_crc:08x}"),
            ));
        }

        payloads.push(payload.to_vec());
        cursor = end;
    }

    Ok(DecodedFrames {
        payloads,
        valid_len: cursor as u64,
    })
}

/// Computes the CRC-32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
