use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::INTELLIGENT_INGESTION;
use crate::types::{Security, StorageAccess, StoreOptions};

/// Errors produced while decoding backend payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("backend error: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Shared form fields
// ---------------------------------------------------------------------------

/// Identity fields sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub apikey: String,
    #[serde(flatten)]
    pub security: Option<Security>,
}

/// Storage fields as they appear in request forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreForm {
    pub store_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_access: Option<StorageAccess>,
}

impl From<&StoreOptions> for StoreForm {
    fn from(opts: &StoreOptions) -> Self {
        Self {
            store_location: opts.location.as_str().to_string(),
            store_region: opts.region.clone(),
            store_container: opts.container.clone(),
            store_path: opts.path.clone(),
            store_access: opts.access,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    #[serde(flatten)]
    pub store: StoreForm,
    /// Asks the backend for intelligent ingestion (best effort).
    #[serde(default, skip_serializing_if = "is_false")]
    pub multipart: bool,
}

/// Transfers one part, or one sub-chunk of a part when `offset` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPartRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub uri: String,
    pub region: String,
    pub upload_id: String,
    pub part: u32,
    /// Size of the bytes carried by this request.
    pub size: u64,
    /// Base64-encoded MD5 digest of the carried bytes.
    pub md5: String,
    /// Offset of the sub-chunk within its part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub multipart: bool,
    pub store_location: String,
}

/// Seals a part after all of its sub-chunks were accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPartRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub uri: String,
    pub region: String,
    pub upload_id: String,
    /// Total size of the file, not of the part.
    pub size: u64,
    pub part: u32,
    pub store_location: String,
}

/// Assembles the uploaded parts into the stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub uri: String,
    pub region: String,
    pub upload_id: String,
    pub filename: String,
    pub mimetype: String,
    pub size: u64,
    /// `part:etag` pairs joined by `;` (regular mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub multipart: bool,
    #[serde(flatten)]
    pub store: StoreForm,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Session coordinates returned by a successful start call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub uri: String,
    pub region: String,
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_type: Option<String>,
}

impl StartResponse {
    /// Decodes a start response body.
    ///
    /// An `error` string in the payload takes precedence over everything else.
    pub fn from_body(body: &serde_json::Value) -> Result<Self, ProtocolError> {
        if let Some(description) = body.get("error").and_then(|e| e.as_str()) {
            return Err(ProtocolError::Rejected(description.to_string()));
        }
        serde_json::from_value(body.clone()).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Returns `true` if the backend accepted intelligent ingestion.
    pub fn is_intelligent(&self) -> bool {
        self.upload_type.as_deref() == Some(INTELLIGENT_INGESTION)
    }
}

/// Encodes a part→etag map as `1:etag1;2:etag2`.
pub fn encode_parts(parts: &BTreeMap<u32, String>) -> String {
    parts
        .iter()
        .map(|(part, etag)| format!("{part}:{etag}"))
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageLocation;
    use serde_json::json;

    /// Inverse of [`encode_parts`], for checking encoded lists.
    fn decode_parts(encoded: &str) -> Option<BTreeMap<u32, String>> {
        if encoded.is_empty() {
            return Some(BTreeMap::new());
        }
        encoded
            .split(';')
            .map(|pair| {
                let (part, etag) = pair.split_once(':')?;
                Some((part.parse().ok()?, etag.to_string()))
            })
            .collect()
    }

    fn creds() -> Credentials {
        Credentials {
            apikey: "KEY".into(),
            security: None,
        }
    }

    #[test]
    fn start_request_flattens_fields() {
        let req = StartRequest {
            credentials: Credentials {
                apikey: "KEY".into(),
                security: Some(Security {
                    policy: "P".into(),
                    signature: "S".into(),
                }),
            },
            filename: "a.bin".into(),
            mimetype: "application/octet-stream".into(),
            size: 10,
            store: StoreForm::from(&StoreOptions {
                location: StorageLocation::Azure,
                container: Some("c".into()),
                ..StoreOptions::default()
            }),
            multipart: true,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["apikey"], "KEY");
        assert_eq!(value["policy"], "P");
        assert_eq!(value["signature"], "S");
        assert_eq!(value["store_location"], "azure");
        assert_eq!(value["store_container"], "c");
        assert_eq!(value["multipart"], true);
        assert!(value.get("store_path").is_none());
    }

    #[test]
    fn start_request_omits_security_and_false_multipart() {
        let req = StartRequest {
            credentials: creds(),
            filename: "a".into(),
            mimetype: "text/plain".into(),
            size: 1,
            store: StoreForm::from(&StoreOptions::default()),
            multipart: false,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("policy").is_none());
        assert!(value.get("multipart").is_none());
    }

    #[test]
    fn start_response_regular() {
        let body = json!({"uri": "/u", "region": "us-east-1", "upload_id": "id1"});
        let resp = StartResponse::from_body(&body).unwrap();
        assert_eq!(resp.upload_id, "id1");
        assert!(!resp.is_intelligent());
    }

    #[test]
    fn start_response_intelligent() {
        let body = json!({
            "uri": "/u", "region": "r", "upload_id": "id1",
            "upload_type": "intelligent_ingestion"
        });
        assert!(StartResponse::from_body(&body).unwrap().is_intelligent());
    }

    #[test]
    fn start_response_error_field_wins() {
        let body = json!({"uri": "/u", "region": "r", "upload_id": "id", "error": "bad key"});
        match StartResponse::from_body(&body) {
            Err(ProtocolError::Rejected(msg)) => assert_eq!(msg, "bad key"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn start_response_missing_fields() {
        let body = json!({"uri": "/u", "region": "r"});
        assert!(matches!(
            StartResponse::from_body(&body),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn sub_chunk_request_carries_offset() {
        let req = UploadPartRequest {
            credentials: creds(),
            uri: "/u".into(),
            region: "r".into(),
            upload_id: "id".into(),
            part: 2,
            size: 4,
            md5: "abc=".into(),
            offset: Some(1024),
            multipart: true,
            store_location: "s3".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["offset"], 1024);
        assert_eq!(value["multipart"], true);
        assert_eq!(value["part"], 2);
    }

    #[test]
    fn parts_encoding() {
        let mut parts = BTreeMap::new();
        parts.insert(2, "e2".to_string());
        parts.insert(1, "e1".to_string());
        parts.insert(10, "e10".to_string());
        let encoded = encode_parts(&parts);
        assert_eq!(encoded, "1:e1;2:e2;10:e10");
        assert_eq!(decode_parts(&encoded).unwrap(), parts);
    }

    #[test]
    fn parts_decoding_rejects_garbage() {
        assert!(decode_parts("").unwrap().is_empty());
        assert!(decode_parts("1e1").is_none());
        assert!(decode_parts("x:e1").is_none());
    }
}
