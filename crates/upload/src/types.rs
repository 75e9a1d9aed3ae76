//! Data types for the upload flow.

use std::sync::Arc;

use cloudpart_protocol::{StoreOptions, UploadProgress};
use cloudpart_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_INTELLIGENT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Tunables for one upload.
///
/// Zero values are replaced with defaults by [`UploadOptions::normalized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadOptions {
    /// Bytes per part (5 MiB).
    pub chunk_size: u64,
    /// Parts in flight at once (5).
    pub part_upload_concurrency: usize,
    /// Sub-chunks in flight per part in intelligent mode (8).
    pub chunk_upload_concurrency: usize,
    /// Bytes per sub-chunk in intelligent mode (1 MiB).
    pub intelligent_chunk_size: u64,
    /// Attempts per part, sub-chunk and commit step (5).
    pub part_retries: u32,
    /// Completion retries after the first attempt (5).
    pub max_completion_retries: u32,
    /// Ask the backend for intelligent ingestion.
    pub prefer_intelligent_ingestion: bool,
    pub store: StoreOptions,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            part_upload_concurrency: 5,
            chunk_upload_concurrency: 8,
            intelligent_chunk_size: DEFAULT_INTELLIGENT_CHUNK_SIZE,
            part_retries: 5,
            max_completion_retries: 5,
            prefer_intelligent_ingestion: true,
            store: StoreOptions::default(),
        }
    }
}

impl UploadOptions {
    /// Returns a copy with every zero size, concurrency or attempt count
    /// replaced by its default.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.chunk_size == 0 {
            self.chunk_size = defaults.chunk_size;
        }
        if self.part_upload_concurrency == 0 {
            self.part_upload_concurrency = defaults.part_upload_concurrency;
        }
        if self.chunk_upload_concurrency == 0 {
            self.chunk_upload_concurrency = defaults.chunk_upload_concurrency;
        }
        if self.intelligent_chunk_size == 0 {
            self.intelligent_chunk_size = defaults.intelligent_chunk_size;
        }
        if self.part_retries == 0 {
            self.part_retries = defaults.part_retries;
        }
        self
    }
}

/// Backend coordinates of a started upload, shared read-only by every step.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    pub uri: String,
    pub region: String,
    pub upload_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub store: StoreOptions,
    /// The backend accepted intelligent ingestion for this upload.
    pub intelligent: bool,
}

/// Result of transferring one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartOutcome {
    /// 1-based part number.
    pub index: u32,
    /// Etag of the stored part (regular mode only).
    pub etag: Option<String>,
    /// The part exhausted its retries.
    pub failed: bool,
    /// The part stopped because the upload was cancelled or aborted.
    pub cancelled: bool,
}

impl PartOutcome {
    pub fn uploaded(index: u32, etag: Option<String>) -> Self {
        Self {
            index,
            etag,
            failed: false,
            cancelled: false,
        }
    }

    pub fn failed(index: u32) -> Self {
        Self {
            index,
            etag: None,
            failed: true,
            cancelled: false,
        }
    }

    pub fn cancelled(index: u32) -> Self {
        Self {
            index,
            etag: None,
            failed: false,
            cancelled: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.failed && !self.cancelled
    }
}

/// Successful completion reply.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl FinalResponse {
    /// Returns a string field of the response body (e.g. `handle`, `url`).
    pub fn field(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(|v| v.as_str())
    }
}

/// Terminal result of an upload.
pub type UploadResult = Result<FinalResponse, UploadError>;

/// Receives progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let opts = UploadOptions::default();
        assert_eq!(opts.chunk_size, 5 * 1024 * 1024);
        assert_eq!(opts.part_upload_concurrency, 5);
        assert_eq!(opts.chunk_upload_concurrency, 8);
        assert_eq!(opts.intelligent_chunk_size, 1024 * 1024);
        assert_eq!(opts.part_retries, 5);
        assert_eq!(opts.max_completion_retries, 5);
        assert!(opts.prefer_intelligent_ingestion);
    }

    #[test]
    fn options_normalized_clamps_zeros() {
        let opts = UploadOptions {
            chunk_size: 0,
            part_upload_concurrency: 0,
            chunk_upload_concurrency: 0,
            intelligent_chunk_size: 0,
            part_retries: 0,
            max_completion_retries: 0,
            ..UploadOptions::default()
        }
        .normalized();
        assert_eq!(opts.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(opts.part_upload_concurrency, 5);
        assert_eq!(opts.chunk_upload_concurrency, 8);
        assert_eq!(opts.intelligent_chunk_size, DEFAULT_INTELLIGENT_CHUNK_SIZE);
        assert_eq!(opts.part_retries, 5);
        // Zero completion retries is meaningful: a single attempt.
        assert_eq!(opts.max_completion_retries, 0);
    }

    #[test]
    fn options_partial_json() {
        let opts: UploadOptions =
            serde_json::from_str(r#"{"chunkSize": 1024, "preferIntelligentIngestion": false}"#)
                .unwrap();
        assert_eq!(opts.chunk_size, 1024);
        assert!(!opts.prefer_intelligent_ingestion);
        assert_eq!(opts.part_upload_concurrency, 5);
    }

    #[test]
    fn part_outcome_constructors() {
        assert!(PartOutcome::uploaded(1, Some("e".into())).is_success());
        assert!(!PartOutcome::failed(2).is_success());
        assert!(!PartOutcome::cancelled(3).is_success());
        assert!(PartOutcome::cancelled(3).cancelled);
    }

    #[test]
    fn final_response_field() {
        let resp = FinalResponse {
            status: 200,
            body: serde_json::json!({"handle": "abc123", "size": 10}),
        };
        assert_eq!(resp.field("handle"), Some("abc123"));
        assert_eq!(resp.field("size"), None);
        assert_eq!(resp.field("missing"), None);
    }
}
