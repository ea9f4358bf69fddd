//! Error types for session storage

/// Errors from credential persistence. In-memory operations cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
