//! Client configuration file.
//!
//! A JSON document holding the API key, optional security policy and
//! default upload options. Missing fields take their defaults.

use std::path::Path;

use cloudpart_protocol::Security;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::types::UploadOptions;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
    #[serde(default)]
    pub options: UploadOptions,
}

impl ClientConfig {
    /// Creates a configuration with default options.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            security: None,
            options: UploadOptions::default(),
        }
    }

    /// Parses a configuration document.
    pub fn from_json(json: &str) -> Result<Self, UploadError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Writes the configuration, readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<(), UploadError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> Result<(), UploadError> {
        if self.api_key.trim().is_empty() {
            return Err(UploadError::Config("api key must not be empty".into()));
        }
        if let Some(security) = &self.security {
            if security.policy.is_empty() || security.signature.is_empty() {
                return Err(UploadError::Config(
                    "security requires both policy and signature".into(),
                ));
            }
        }
        Ok(())
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
