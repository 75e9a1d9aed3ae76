use serde::{Deserialize, Serialize};

/// Value of the start response's `upload_type` field when the backend
/// accepted the upload in intelligent ingestion mode.
pub const INTELLIGENT_INGESTION: &str = "intelligent_ingestion";

/// HTTP status the backend returns for every successful step.
pub const STATUS_OK: u16 = 200;

/// MIME type assumed when neither the caller nor the source provides one.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Multipart API endpoint identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Opens an upload session.
    #[serde(rename = "multipart/start")]
    Start,
    /// Transfers a part, or a sub-chunk of a part in intelligent mode.
    #[serde(rename = "multipart/upload")]
    Upload,
    /// Seals a part whose sub-chunks were all transferred (intelligent mode).
    #[serde(rename = "multipart/commit")]
    Commit,
    /// Assembles the uploaded parts into the final object.
    #[serde(rename = "multipart/complete")]
    Complete,
}

impl Endpoint {
    /// Returns the path relative to the upload API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Start => "multipart/start",
            Endpoint::Upload => "multipart/upload",
            Endpoint::Commit => "multipart/commit",
            Endpoint::Complete => "multipart/complete",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
