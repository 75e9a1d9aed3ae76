//! Multipart upload orchestration.
//!
//! An upload opens a session with the backend, transfers the source in
//! fixed-size parts through a bounded pool of concurrent tasks and asks the
//! backend to assemble the parts once every part was accepted. Backends that
//! support intelligent ingestion receive each part as smaller sub-chunks
//! followed by a per-part commit.
//!
//! HTTP is left to the embedding application through [`UploadTransport`].

mod client;
mod config;
mod delivery;
mod error;
mod multifile;
mod orchestrator;
mod part;
mod retry;
mod steps;
mod transport;
mod types;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{AbortReason, TransportError, UploadError};
pub use multifile::MultifileUpload;
pub use orchestrator::UploadOrchestrator;
pub use retry::{RetryError, RetryingStep, completion_backoff};
pub use transport::{TransportFuture, TransportResponse, UploadTransport};
pub use types::{
    FinalResponse, PartOutcome, ProgressCallback, UploadOptions, UploadResult, UploadSession,
};

pub use cloudpart_protocol::{
    Endpoint, Security, StorageAccess, StorageLocation, StoreOptions, UploadProgress,
    UploadStatus,
};
pub use cloudpart_transfer::{FileSource, MemorySource, UploadSource};
