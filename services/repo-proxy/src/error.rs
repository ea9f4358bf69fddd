//! Client-facing error contract
//!
//! Every failure of the authorization flow or the gateway ends the request;
//! nothing is retried. The response body is
//! `{"error":{"type":"<reason>","message":"<text>"}}` where `type` is a
//! stable machine-readable reason. Messages never contain tokens.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provider::UpstreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Forged, replayed, expired, or never-issued callback state
    #[error("invalid state parameter")]
    InvalidState,

    /// The user declined, or GitHub reported an error on the callback
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("failed to get access token: {0}")]
    TokenExchangeFailed(String),

    #[error("failed to get user info: {0}")]
    ProfileFetchFailed(String),

    /// Unknown subject id
    #[error("user not authenticated")]
    Unauthenticated,

    /// Upstream failure; `status` is what the client sees
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    /// Content declared base64 could not be decoded to text
    #[error("failed to decode file content: {0}")]
    Decode(String),

    #[error("credential storage failed: {0}")]
    Storage(String),
}

impl ApiError {
    /// Forward the upstream status when there is one. A timeout becomes 504,
    /// any other transport failure 502.
    pub fn from_upstream(err: UpstreamError) -> Self {
        let status = match (err.status_code(), &err) {
            (Some(code), _) => StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY),
            (None, UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            (None, _) => StatusCode::BAD_GATEWAY,
        };
        Self::Upstream {
            status,
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidState
            | Self::AuthorizationDenied(_)
            | Self::TokenExchangeFailed(_)
            | Self::ProfileFetchFailed(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Upstream { status, .. } => *status,
            Self::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason, also used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::AuthorizationDenied(_) => "authorization_denied",
            Self::TokenExchangeFailed(_) => "token_exchange_failed",
            Self::ProfileFetchFailed(_) => "profile_fetch_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::Upstream { .. } => "upstream_error",
            Self::Decode(_) => "decode_error",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}
