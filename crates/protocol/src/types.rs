use serde::{Deserialize, Serialize};

/// Storage provider the backend writes the assembled object to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    #[default]
    S3,
    Gcs,
    Azure,
    Dropbox,
    Rackspace,
}

impl StorageLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageLocation::S3 => "s3",
            StorageLocation::Gcs => "gcs",
            StorageLocation::Azure => "azure",
            StorageLocation::Dropbox => "dropbox",
            StorageLocation::Rackspace => "rackspace",
        }
    }
}

/// Access level of the stored object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAccess {
    Public,
    #[default]
    Private,
}

/// Where and how the backend should store the uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub location: StorageLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<StorageAccess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Overrides the file name derived from the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Overrides the MIME type derived from the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Signed policy authorizing the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub policy: String,
    pub signature: String,
}

/// Lifecycle state of a multipart upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Idle,
    Starting,
    SubmittingParts,
    AwaitingCompletion,
    Completing,
    Succeeded,
    Failed,
    Aborted,
}

impl UploadStatus {
    /// Returns `true` once the upload can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Succeeded | UploadStatus::Failed | UploadStatus::Aborted
        )
    }
}

/// Aggregate progress of an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    #[serde(default)]
    pub bytes_per_second: f64,
}

impl UploadProgress {
    /// Returns the upload progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.uploaded_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    /// Returns `true` when every byte has been confirmed.
    pub fn is_complete(&self) -> bool {
        self.uploaded_bytes >= self.total_bytes
    }
}
