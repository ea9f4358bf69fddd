//! Provider abstraction for the upstream source-control API
//!
//! Defines the `Provider` trait that decouples the authorization flow and the
//! repository gateway from any one hosting service. A provider knows how to
//! build its authorization URL, exchange an authorization code for a bearer
//! token, and answer the handful of authenticated reads the gateway proxies.
//! `github::GitHubProvider` is the production implementation; tests plug in
//! stubs.

mod error;

pub use error::{Result, UpstreamError};

use common::Secret;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Repository location addressed by the contents endpoints.
///
/// An empty `path` addresses the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLocation {
    pub owner: String,
    pub repo: String,
    pub path: String,
}

impl ContentLocation {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            path: path.into(),
        }
    }

    /// Non-empty path segments, with leading/trailing/duplicate slashes dropped.
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }
}

/// Health status reported by a provider for the /health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// "healthy" when client credentials are configured, "unconfigured" otherwise
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Abstraction over the upstream hosting API.
///
/// Every call that touches the network is a suspension point; nothing here
/// blocks a worker thread. Non-success upstream responses come back as
/// `UpstreamError::Status` with the original status code so callers can
/// forward it.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Provider>`).
pub trait Provider: Send + Sync {
    /// Identifier for logging and health reporting (e.g. "github")
    fn id(&self) -> &str;

    /// Authorization endpoint URL carrying the client id, redirect target,
    /// scope, and the anti-forgery `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a bearer token.
    ///
    /// Fails with `UpstreamError::TokenExchange` when the token endpoint
    /// answers with a non-success status or without a token.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>>;

    /// Profile of the user owning `token`.
    fn fetch_profile<'a>(
        &'a self,
        token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Stable numeric subject identifier inside a profile returned by
    /// `fetch_profile`.
    fn subject_id(&self, profile: &serde_json::Value) -> Option<u64> {
        profile.get("id").and_then(serde_json::Value::as_u64)
    }

    /// Repositories visible to the token owner, public and private, most
    /// recently updated first.
    fn list_repositories<'a>(
        &'a self,
        token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Directory listing (or single-file object) at `location`.
    fn list_contents<'a>(
        &'a self,
        token: &'a Secret<String>,
        location: &'a ContentLocation,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Metadata + content envelope of one file at `location`.
    fn get_file<'a>(
        &'a self,
        token: &'a Secret<String>,
        location: &'a ContentLocation,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Provider health for the /health endpoint.
    fn health(&self) -> ProviderHealth;
}
