//! The individual network steps of an upload.
//!
//! Each step builds one request form, sends it through the transport and
//! interprets the reply. Part-level steps report a single attempt as
//! `Option`; retrying is left to [`RetryingStep`](crate::retry::RetryingStep).

use std::collections::BTreeMap;
use std::sync::Arc;

use cloudpart_protocol::{
    CommitPartRequest, CompleteRequest, Credentials, Endpoint, ProtocolError, StartRequest,
    StartResponse, StoreForm, UploadPartRequest, encode_parts,
};
use cloudpart_transfer::{Part, SourceInfo, SubChunk, checksum_md5};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{TransportError, UploadError};
use crate::transport::{TransportResponse, UploadTransport};
use crate::types::{FinalResponse, UploadOptions, UploadSession};

/// Outcome of a single completion attempt.
#[derive(Debug)]
pub(crate) enum CompletionAttempt {
    Accepted(FinalResponse),
    Rejected { status: u16 },
    NetworkError(TransportError),
}

/// Sends requests on behalf of one client identity.
pub(crate) struct Steps {
    transport: Arc<dyn UploadTransport>,
    credentials: Credentials,
}

impl Steps {
    pub fn new(transport: Arc<dyn UploadTransport>, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Opens the upload session.
    pub async fn start(
        &self,
        info: &SourceInfo,
        options: &UploadOptions,
    ) -> Result<UploadSession, UploadError> {
        let form = serde_json::to_value(StartRequest {
            credentials: self.credentials.clone(),
            filename: info.file_name.clone(),
            mimetype: info.mime_type.clone(),
            size: info.file_size,
            store: StoreForm::from(&options.store),
            multipart: options.prefer_intelligent_ingestion,
        })?;

        let resp = self
            .transport
            .send_request(Endpoint::Start, &form)
            .await
            .map_err(|e| UploadError::SessionStartFailed(e.to_string()))?;

        let start = match StartResponse::from_body(&resp.body) {
            Err(ProtocolError::Rejected(description)) => {
                return Err(UploadError::BackendRejected(description));
            }
            _ if !resp.is_ok() => {
                return Err(UploadError::SessionStartFailed(format!(
                    "unexpected status {}",
                    resp.status
                )));
            }
            Ok(start) => start,
            Err(e) => return Err(UploadError::SessionStartFailed(e.to_string())),
        };

        Ok(UploadSession {
            intelligent: start.is_intelligent(),
            uri: start.uri,
            region: start.region,
            upload_id: start.upload_id,
            file_name: info.file_name.clone(),
            file_size: info.file_size,
            mime_type: info.mime_type.clone(),
            store: options.store.clone(),
        })
    }

    /// Uploads a whole part and returns its etag.
    ///
    /// A 200 without an etag counts as a failed attempt.
    pub async fn upload_part(
        &self,
        session: &UploadSession,
        part: &Part,
        data: &[u8],
    ) -> Option<String> {
        let form = self.part_form(session, part.index, data, None)?;
        let resp = self.send_data(Endpoint::Upload, &form, data).await?;
        if !resp.is_ok() {
            debug!(part = part.index, status = resp.status, "part rejected");
            return None;
        }
        match resp.etag {
            Some(etag) => Some(etag),
            None => {
                warn!(part = part.index, "part accepted without etag");
                None
            }
        }
    }

    /// Uploads one sub-chunk of a part (intelligent mode).
    pub async fn upload_chunk(
        &self,
        session: &UploadSession,
        part: &Part,
        chunk: &SubChunk,
        data: &[u8],
    ) -> Option<()> {
        let form = self.part_form(session, part.index, data, Some(chunk.offset_in_part))?;
        let resp = self.send_data(Endpoint::Upload, &form, data).await?;
        if !resp.is_ok() {
            debug!(
                part = part.index,
                offset = chunk.offset_in_part,
                status = resp.status,
                "sub-chunk rejected"
            );
            return None;
        }
        Some(())
    }

    /// Seals a part whose sub-chunks were all accepted (intelligent mode).
    pub async fn commit_part(&self, session: &UploadSession, part: &Part) -> Option<()> {
        let form = to_form(&CommitPartRequest {
            credentials: self.credentials.clone(),
            uri: session.uri.clone(),
            region: session.region.clone(),
            upload_id: session.upload_id.clone(),
            size: session.file_size,
            part: part.index,
            store_location: session.store.location.as_str().to_string(),
        })?;
        let resp = match self.transport.send_request(Endpoint::Commit, &form).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(part = part.index, error = %e, "commit request failed");
                return None;
            }
        };
        if !resp.is_ok() {
            debug!(part = part.index, status = resp.status, "commit rejected");
            return None;
        }
        Some(())
    }

    /// Asks the backend to assemble the parts.
    ///
    /// `etags` is `None` in intelligent mode.
    pub async fn complete(
        &self,
        session: &UploadSession,
        etags: Option<&BTreeMap<u32, String>>,
    ) -> CompletionAttempt {
        let request = CompleteRequest {
            credentials: self.credentials.clone(),
            uri: session.uri.clone(),
            region: session.region.clone(),
            upload_id: session.upload_id.clone(),
            filename: session.file_name.clone(),
            mimetype: session.mime_type.clone(),
            size: session.file_size,
            parts: etags.map(encode_parts),
            multipart: session.intelligent,
            store: StoreForm::from(&session.store),
        };
        let Some(form) = to_form(&request) else {
            return CompletionAttempt::Rejected { status: 0 };
        };

        match self.transport.send_request(Endpoint::Complete, &form).await {
            Ok(resp) if resp.is_ok() => CompletionAttempt::Accepted(FinalResponse {
                status: resp.status,
                body: resp.body,
            }),
            Ok(resp) => CompletionAttempt::Rejected {
                status: resp.status,
            },
            Err(e) => CompletionAttempt::NetworkError(e),
        }
    }

    // ----- Helpers -----

    fn part_form(
        &self,
        session: &UploadSession,
        index: u32,
        data: &[u8],
        offset: Option<u64>,
    ) -> Option<serde_json::Value> {
        to_form(&UploadPartRequest {
            credentials: self.credentials.clone(),
            uri: session.uri.clone(),
            region: session.region.clone(),
            upload_id: session.upload_id.clone(),
            part: index,
            size: data.len() as u64,
            md5: checksum_md5(data),
            offset,
            multipart: session.intelligent,
            store_location: session.store.location.as_str().to_string(),
        })
    }

    async fn send_data(
        &self,
        endpoint: Endpoint,
        form: &serde_json::Value,
        data: &[u8],
    ) -> Option<TransportResponse> {
        match self.transport.send_data(endpoint, form, data).await {
            Ok(resp) => Some(resp),
            Err(e) => {
                debug!(endpoint = %endpoint, error = %e, "request failed");
                None
            }
        }
    }
}

fn to_form<T: Serialize>(request: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(request) {
        Ok(form) => Some(form),
        Err(e) => {
            warn!(error = %e, "failed to encode request form");
            None
        }
    }
}
