//! Server-side session state for the repository proxy
//!
//! Two process-scoped stores, each constructed once at startup and shared
//! by `Arc` with the authorization flow and the gateway:
//!
//! - `PendingAuthRegistry`: anti-forgery `state` tokens minted for an
//!   authorization redirect, consumed exactly once by the callback.
//! - `CredentialStore`: subject id → bearer token + cached profile. The
//!   token never leaves this process except toward the upstream API.

pub mod credentials;
pub mod error;
pub mod pending;

pub use credentials::{Credential, CredentialStore, SubjectId};
pub use error::{Error, Result};
pub use pending::{DEFAULT_STATE_TTL, PendingAuthRegistry, generate_state};
