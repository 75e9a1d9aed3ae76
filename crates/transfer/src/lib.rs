//! Upload sources, part planning and progress accounting.
//!
//! A source is split into fixed-size [`Part`]s; in intelligent ingestion
//! mode each part is further split into [`SubChunk`]s. Sources support
//! positioned reads so several parts can be read concurrently.

mod chunked;
mod progress;
mod source;
mod types;
mod validation;

pub use chunked::{checksum_md5, plan_parts, plan_sub_chunks};
pub use progress::ProgressCounter;
pub use source::{FileSource, MemorySource, UploadSource};
pub use types::{Part, SubChunk};
pub use validation::{SourceInfo, detect_mime_type, resolve_source};

/// Default part size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default sub-chunk size used inside a part in intelligent mode: 1 MiB.
pub const DEFAULT_INTELLIGENT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("{parts} parts of {chunk_size} bytes exceed the part number range")]
    TooManyParts { parts: u64, chunk_size: u64 },

    #[error("read out of range: offset {offset} + {len} exceeds size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },
}
