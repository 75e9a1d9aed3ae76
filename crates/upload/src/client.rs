//! Entry point bundling a transport with an identity and default options.

use std::path::Path;
use std::sync::Arc;

use cloudpart_protocol::{Credentials, Security};
use cloudpart_transfer::{FileSource, MemorySource, UploadSource};

use crate::config::ClientConfig;
use crate::error::UploadError;
use crate::multifile::MultifileUpload;
use crate::orchestrator::UploadOrchestrator;
use crate::transport::UploadTransport;
use crate::types::UploadOptions;

/// Creates uploads that share one transport and API identity.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn UploadTransport>,
    credentials: Credentials,
    options: UploadOptions,
}

impl Client {
    /// Creates a client with default upload options.
    pub fn new(api_key: impl Into<String>, transport: Arc<dyn UploadTransport>) -> Self {
        Self {
            transport,
            credentials: Credentials {
                apikey: api_key.into(),
                security: None,
            },
            options: UploadOptions::default(),
        }
    }

    /// Creates a client from a loaded configuration.
    pub fn from_config(config: ClientConfig, transport: Arc<dyn UploadTransport>) -> Self {
        Self {
            transport,
            credentials: Credentials {
                apikey: config.api_key,
                security: config.security,
            },
            options: config.options,
        }
    }

    /// Signs every request with `security`.
    pub fn with_security(mut self, security: Security) -> Self {
        self.credentials.security = Some(security);
        self
    }

    /// Replaces the default upload options.
    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Default upload options.
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Prepares an upload of `source`. Call `start` on the result.
    ///
    /// `options` overrides the client defaults for this upload.
    pub fn upload(
        &self,
        source: Arc<dyn UploadSource>,
        options: Option<UploadOptions>,
    ) -> UploadOrchestrator {
        UploadOrchestrator::new(
            Arc::clone(&self.transport),
            self.credentials.clone(),
            source,
            options.unwrap_or_else(|| self.options.clone()),
        )
    }

    /// Prepares an upload of the file at `path`.
    pub fn upload_file(
        &self,
        path: &Path,
        options: Option<UploadOptions>,
    ) -> Result<UploadOrchestrator, UploadError> {
        let source = FileSource::open(path)?;
        Ok(self.upload(Arc::new(source), options))
    }

    /// Prepares an upload of an in-memory buffer.
    pub fn upload_data(
        &self,
        data: impl Into<Vec<u8>>,
        options: Option<UploadOptions>,
    ) -> UploadOrchestrator {
        self.upload(Arc::new(MemorySource::new(data)), options)
    }

    /// Prepares a sequential upload of several sources.
    pub fn upload_files(
        &self,
        sources: Vec<Arc<dyn UploadSource>>,
        options: Option<UploadOptions>,
    ) -> MultifileUpload {
        MultifileUpload::new(
            Arc::clone(&self.transport),
            self.credentials.clone(),
            sources,
            options.unwrap_or_else(|| self.options.clone()),
        )
    }
}
