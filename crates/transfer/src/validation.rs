use std::path::Path;

use cloudpart_protocol::StoreOptions;
use cloudpart_protocol::constants::DEFAULT_MIME_TYPE;

use crate::TransferError;
use crate::source::UploadSource;

/// Name, size and MIME type an upload is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

/// Resolves the identity of `source` before any network call.
///
/// - Name: `store.filename`, else the source's name, else a random UUID.
/// - MIME type: `store.mime_type`, else the source's, else `text/plain`.
///
/// Fails if the size is unknown or the resolved name is empty.
pub fn resolve_source(
    source: &dyn UploadSource,
    store: &StoreOptions,
) -> Result<SourceInfo, TransferError> {
    let file_size = source
        .size()
        .ok_or_else(|| TransferError::InvalidSource("size could not be determined".into()))?;

    let file_name = store
        .filename
        .clone()
        .or_else(|| source.name())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if file_name.trim().is_empty() {
        return Err(TransferError::InvalidSource("empty file name".into()));
    }

    let mime_type = store
        .mime_type
        .clone()
        .or_else(|| source.mime_type())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    Ok(SourceInfo {
        file_name,
        file_size,
        mime_type,
    })
}

/// Guesses a MIME type from a file extension (case-insensitive).
pub fn detect_mime_type(path: &str) -> Option<&'static str> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        Some("ico") => Some("image/x-icon"),
        Some("svg") => Some("image/svg+xml"),
        Some("mp4") => Some("video/mp4"),
        Some("mov") => Some("video/quicktime"),
        Some("mp3") => Some("audio/mpeg"),
        Some("pdf") => Some("application/pdf"),
        Some("zip") => Some("application/zip"),
        Some("json") => Some("application/json"),
        Some("txt") => Some("text/plain"),
        Some("html" | "htm") => Some("text/html"),
        Some("csv") => Some("text/csv"),
        _ => None,
    }
}
