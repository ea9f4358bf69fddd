//! Upstream error taxonomy

/// Failures talking to the upstream hosting API.
///
/// `Status` preserves the upstream HTTP status code so the gateway can
/// forward it rather than inventing its own.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Upstream status code, when the upstream answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Low-cardinality label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::TokenExchange(_) => "token_exchange",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_only_for_status_variant() {
        assert_eq!(UpstreamError::status(404, "Not Found").status_code(), Some(404));
        assert_eq!(UpstreamError::Http("refused".into()).status_code(), None);
        assert_eq!(UpstreamError::TokenExchange("no token".into()).status_code(), None);
    }

    #[test]
    fn display_includes_status() {
        let err = UpstreamError::status(403, "rate limited");
        assert_eq!(err.to_string(), "upstream returned 403: rate limited");
        assert_eq!(err.kind(), "status");
    }
}
