//! `Provider` implementation backed by the GitHub REST API

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use provider::{ContentLocation, Provider, ProviderHealth, Result, UpstreamError};

use crate::constants::{API_BASE_URL, AUTHORIZE_ENDPOINT, TOKEN_ENDPOINT};
use crate::{api, authorize, token};

/// OAuth application registration plus endpoint overrides.
#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Callback URL registered with the OAuth application
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_url: String,
    /// Upper bound on `Link: rel="next"` pages followed when listing
    /// repositories. 1 returns the first page exactly as GitHub sends it.
    pub max_repo_pages: u32,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: Secret::new(String::new()),
            redirect_uri: String::new(),
            authorize_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            api_url: API_BASE_URL.to_string(),
            max_repo_pages: 1,
        }
    }
}

/// Build the outbound HTTP client shared by every GitHub call.
///
/// `timeout` bounds each upstream round trip; GitHub requires a User-Agent.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| UpstreamError::Http(format!("building HTTP client: {e}")))
}

pub struct GitHubProvider {
    http: reqwest::Client,
    settings: GitHubSettings,
}

impl GitHubProvider {
    pub fn new(http: reqwest::Client, settings: GitHubSettings) -> Self {
        Self { http, settings }
    }
}

impl Provider for GitHubProvider {
    fn id(&self) -> &str {
        "github"
    }

    fn authorization_url(&self, state: &str) -> String {
        authorize::build_authorization_url(&self.settings, state)
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>> {
        Box::pin(token::exchange_code(&self.http, &self.settings, code))
    }

    fn fetch_profile<'a>(
        &'a self,
        token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(api::fetch_profile(&self.http, &self.settings.api_url, token))
    }

    fn list_repositories<'a>(
        &'a self,
        token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(api::list_repositories(
            &self.http,
            &self.settings.api_url,
            token,
            self.settings.max_repo_pages,
        ))
    }

    fn list_contents<'a>(
        &'a self,
        token: &'a Secret<String>,
        location: &'a ContentLocation,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(api::get_contents(
            &self.http,
            &self.settings.api_url,
            token,
            location,
        ))
    }

    fn get_file<'a>(
        &'a self,
        token: &'a Secret<String>,
        location: &'a ContentLocation,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        // Same endpoint as a listing; GitHub answers a file path with the envelope.
        Box::pin(api::get_contents(
            &self.http,
            &self.settings.api_url,
            token,
            location,
        ))
    }

    fn health(&self) -> ProviderHealth {
        if self.settings.client_id.is_empty() || self.settings.client_secret.is_empty() {
            ProviderHealth {
                status: "unconfigured".to_string(),
                detail: Some("GITHUB_CLIENT_ID or GITHUB_CLIENT_SECRET is not set".to_string()),
            }
        } else {
            ProviderHealth {
                status: "healthy".to_string(),
                detail: None,
            }
        }
    }
}
