//! Transport abstraction used by every network step.
//!
//! The upload logic never talks HTTP directly. An embedding application
//! implements [`UploadTransport`] on top of its HTTP client; tests use mocks.

use std::future::Future;
use std::pin::Pin;

use cloudpart_protocol::Endpoint;
use cloudpart_protocol::constants::STATUS_OK;

use crate::error::TransportError;

/// Future returned by transport calls.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// Reply to a request that reached the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded JSON body, or `Null` if the body was empty or not JSON.
    pub body: serde_json::Value,
    /// Value of the `ETag` response header, if any.
    pub etag: Option<String>,
}

impl TransportResponse {
    /// Creates a response with the given status and body and no etag.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            etag: None,
        }
    }

    /// Sets the etag header value.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Returns `true` for the only status the backend uses for success.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Sends upload API requests.
///
/// `form` is a flat JSON object whose fields map one-to-one onto multipart
/// form fields. Implementations return `Err` only when no response was
/// received at all; any HTTP status is an `Ok` response.
pub trait UploadTransport: Send + Sync {
    /// Sends a form-only request.
    fn send_request(&self, endpoint: Endpoint, form: &serde_json::Value) -> TransportFuture<'_>;

    /// Sends a form together with a binary payload (the `fileUpload` field).
    fn send_data(
        &self,
        endpoint: Endpoint,
        form: &serde_json::Value,
        data: &[u8],
    ) -> TransportFuture<'_>;
}
