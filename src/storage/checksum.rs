//! Record framing with CRC32 integrity check
//!
//! Every node record written by [`DirStore`](super::DirStore) is framed as
//! `[payload_len: u32 LE][payload][crc32: u32 LE]`. With checksums disabled
//! the trailer is written as zero and ignored on read.

use crate::error::StoreError;
use crc32fast::Hasher;

/// Frame overhead in bytes (length prefix + trailer)
pub const FRAME_OVERHEAD: usize = 8;

/// Checksum mode of a record frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumType {
    #[default]
    CRC32,
    None,
}

impl ChecksumType {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::CRC32
        } else {
            Self::None
        }
    }

    pub fn compute(self, data: &[u8]) -> u32 {
        match self {
            Self::CRC32 => {
                let mut hasher = Hasher::new();
                hasher.update(data);
                hasher.finalize()
            }
            Self::None => 0,
        }
    }
}

/// Frame `payload` for storage.
pub fn encode_frame(checksum: ChecksumType, payload: &[u8]) -> Vec<u8> {
    let crc = checksum.compute(payload);
    let mut framed = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(payload);
    framed.extend_from_slice(&crc.to_le_bytes());
    framed
}

/// Unframe a stored record, verifying its length and checksum.
pub fn decode_frame(checksum: ChecksumType, framed: &[u8]) -> Result<&[u8], StoreError> {
    if framed.len() < FRAME_OVERHEAD {
        return Err(StoreError::Corruption(format!(
            "record too short: {} bytes",
            framed.len()
        )));
    }

    let payload_len = u32::from_le_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
    if framed.len() != payload_len + FRAME_OVERHEAD {
        return Err(StoreError::Corruption(format!(
            "record length mismatch: header says {} payload bytes, file holds {}",
            payload_len,
            framed.len() - FRAME_OVERHEAD
        )));
    }

    let payload = &framed[4..4 + payload_len];
    if checksum == ChecksumType::None {
        return Ok(payload);
    }

    let trailer = &framed[4 + payload_len..];
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = checksum.compute(payload);
    if actual != expected {
        return Err(StoreError::Corruption(format!(
            "checksum mismatch: expected {:#010x}, got {:#010x} (payload_len={})",
            expected, actual, payload_len
        )));
    }

    Ok(payload)
}
