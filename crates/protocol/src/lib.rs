//! Request and response payloads for the multipart upload API.
//!
//! Every request is a flat form of string-like fields; the types here
//! serialize to that shape through `serde_json` so the transport only has
//! to turn a JSON object into form parts.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Endpoint;
pub use messages::{
    CommitPartRequest, CompleteRequest, Credentials, ProtocolError, StartRequest, StartResponse,
    StoreForm, UploadPartRequest, encode_parts,
};
pub use types::{
    Security, StorageAccess, StorageLocation, StoreOptions, UploadProgress, UploadStatus,
};
