//! Authenticated repository reads on behalf of a stored subject
//!
//! Each operation resolves the subject id to its credential first; an
//! unknown id fails with `Unauthenticated` before anything is sent upstream.
//! The gateway only reads the credential store.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use axum::http::StatusCode;
use provider::{ContentLocation, Provider, UpstreamError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use session::{Credential, CredentialStore, SubjectId};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::metrics;

/// Body of `GET /user/{id}/repo/{owner}/{repo}/file`.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileResponse {
    /// base64 content decoded to text
    Decoded(DecodedFile),
    /// Envelope returned unchanged (non-base64 encoding, or a directory)
    Raw(Value),
}

#[derive(Debug, PartialEq, Serialize)]
pub struct DecodedFile {
    pub name: String,
    pub path: String,
    pub content: String,
    pub size: u64,
}

#[derive(Deserialize)]
struct Base64Envelope {
    name: String,
    path: String,
    content: String,
    size: u64,
}

pub struct ProxyGateway {
    provider: Arc<dyn Provider>,
    credentials: Arc<CredentialStore>,
}

impl ProxyGateway {
    pub fn new(provider: Arc<dyn Provider>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            provider,
            credentials,
        }
    }

    async fn credential(&self, subject_id: SubjectId) -> Result<Credential, ApiError> {
        self.credentials.get(subject_id).await.ok_or_else(|| {
            debug!(subject_id, "no credential for subject");
            ApiError::Unauthenticated
        })
    }

    /// Cached profile from authorization time. No upstream call.
    pub async fn user_info(&self, subject_id: SubjectId) -> Result<Value, ApiError> {
        Ok(self.credential(subject_id).await?.profile)
    }

    /// Upstream repository list, verbatim.
    ///
    /// Upstream failures are reported as 400 whatever the upstream status.
    pub async fn list_repositories(&self, subject_id: SubjectId) -> Result<Value, ApiError> {
        let credential = self.credential(subject_id).await?;
        self.provider
            .list_repositories(&credential.access_token)
            .await
            .map_err(|e| {
                let e = upstream_failure(subject_id, e);
                ApiError::Upstream {
                    status: StatusCode::BAD_REQUEST,
                    message: format!("failed to fetch repositories: {e}"),
                }
            })
    }

    /// Upstream directory listing, verbatim. Upstream status is forwarded.
    pub async fn list_contents(
        &self,
        subject_id: SubjectId,
        location: &ContentLocation,
    ) -> Result<Value, ApiError> {
        let credential = self.credential(subject_id).await?;
        self.provider
            .list_contents(&credential.access_token, location)
            .await
            .map_err(|e| ApiError::from_upstream(upstream_failure(subject_id, e)))
    }

    /// File envelope with base64 content decoded to text. Upstream status is
    /// forwarded.
    pub async fn get_file(
        &self,
        subject_id: SubjectId,
        location: &ContentLocation,
    ) -> Result<FileResponse, ApiError> {
        let credential = self.credential(subject_id).await?;
        let envelope = self
            .provider
            .get_file(&credential.access_token, location)
            .await
            .map_err(|e| ApiError::from_upstream(upstream_failure(subject_id, e)))?;
        decode_file(envelope)
    }
}

fn upstream_failure(subject_id: SubjectId, err: UpstreamError) -> UpstreamError {
    metrics::record_upstream_error(err.kind());
    warn!(subject_id, error = %err, "upstream request failed");
    err
}

/// Decode an envelope whose `encoding` is `base64`; pass anything else
/// through unchanged.
///
/// GitHub wraps base64 content at 60 columns, so ASCII whitespace is
/// dropped before decoding. Bytes that are not UTF-8 (a binary file) are a
/// decode error rather than lossy text.
pub fn decode_file(envelope: Value) -> Result<FileResponse, ApiError> {
    if envelope.get("encoding").and_then(Value::as_str) != Some("base64") {
        return Ok(FileResponse::Raw(envelope));
    }

    let file: Base64Envelope = serde_json::from_value(envelope)
        .map_err(|e| ApiError::Decode(format!("malformed file envelope: {e}")))?;
    let compact: String = file
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| ApiError::Decode(format!("invalid base64 in {}: {e}", file.path)))?;
    let content = String::from_utf8(bytes)
        .map_err(|_| ApiError::Decode(format!("{} is not UTF-8 text", file.path)))?;

    Ok(FileResponse::Decoded(DecodedFile {
        name: file.name,
        path: file.path,
        content,
        size: file.size,
    }))
}
