use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};

use crate::types::{Part, SubChunk};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_INTELLIGENT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes the MD5 of `data` and returns the base64-encoded digest, the form
/// storage backends expect in `Content-MD5`.
pub fn checksum_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Splits `file_size` bytes into parts of `chunk_size` bytes.
///
/// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (5 MiB) is used. The last part
/// may be shorter; an empty source yields no parts. Fails if the part count
/// does not fit a `u32` part number.
pub fn plan_parts(file_size: u64, chunk_size: u64) -> Result<Vec<Part>, TransferError> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let count = file_size.div_ceil(chunk_size);
    if count > u64::from(u32::MAX) {
        return Err(TransferError::TooManyParts {
            parts: count,
            chunk_size,
        });
    }

    let mut parts = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for index in 1..=count as u32 {
        let size = chunk_size.min(file_size - offset);
        parts.push(Part {
            index,
            offset,
            size,
        });
        offset += size;
    }
    Ok(parts)
}

/// Splits a part of `part_size` bytes into sub-chunks of `chunk_size` bytes.
///
/// If `chunk_size` is 0, [`DEFAULT_INTELLIGENT_CHUNK_SIZE`] (1 MiB) is used.
pub fn plan_sub_chunks(part_size: u64, chunk_size: u64) -> Vec<SubChunk> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_INTELLIGENT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let mut chunks = Vec::with_capacity(part_size.div_ceil(chunk_size) as usize);
    let mut offset = 0u64;
    while offset < part_size {
        let size = chunk_size.min(part_size - offset);
        chunks.push(SubChunk {
            offset_in_part: offset,
            size,
        });
        offset += size;
    }
    chunks
}
