//! Upload error types.

use cloudpart_transfer::TransferError;

/// Why an upload ended in the aborted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    #[error("part {part} exhausted its retries")]
    PartTransferFailed { part: u32 },

    #[error("completion exhausted its retries")]
    CompletionFailed,

    #[error("cancelled")]
    Cancelled,
}

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("session start failed: {0}")]
    SessionStartFailed(String),

    #[error("backend rejected upload: {0}")]
    BackendRejected(String),

    #[error("upload aborted: {0}")]
    Aborted(AbortReason),

    #[error("upload already started")]
    AlreadyStarted,

    #[error("no tokio runtime to run the upload on")]
    NoRuntime,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Returns the abort reason if this is an aborted upload.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            UploadError::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns `true` if the upload was aborted (part failure, completion
    /// failure or cancellation).
    pub fn is_aborted(&self) -> bool {
        self.abort_reason().is_some()
    }
}

impl From<TransferError> for UploadError {
    fn from(e: TransferError) -> Self {
        UploadError::InvalidSource(e.to_string())
    }
}

/// Errors a transport reports for a request that produced no response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Other(String),
}
