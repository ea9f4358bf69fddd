//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The config file is
//! optional; a deployment can run from environment variables alone.
//!
//! The client secret is loaded from GITHUB_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly to avoid leaking
//! secrets. Missing client credentials are not a startup error: GitHub
//! rejects the token exchange and the callback reports it.

use common::Secret;
use github::GitHubSettings;
use reqwest::Url;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "github-repo-proxy.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub frontend: FrontendConfig,
    pub session: SessionConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    /// Extra CORS origins on top of the frontend URL
    pub cors_origins: Vec<String>,
}

/// OAuth application registration and GitHub endpoints
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to GITHUB_CLIENT_SECRET)
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_repo_pages: u32,
}

/// Presentation layer the callback redirects back to
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds an issued state stays valid for the callback
    pub state_ttl_secs: u64,
    /// Persist credentials to this JSON file; in-memory only when unset
    pub credentials_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 1000,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            client_secret_file: None,
            redirect_uri: "http://localhost:8000/auth/github/callback".to_string(),
            authorize_url: github::AUTHORIZE_ENDPOINT.to_string(),
            token_url: github::TOKEN_ENDPOINT.to_string(),
            api_url: github::API_BASE_URL.to_string(),
            user_agent: github::DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            max_repo_pages: 1,
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8501".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: session::DEFAULT_STATE_TTL.as_secs(),
            credentials_path: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay
    /// environment variables and validate.
    ///
    /// Client secret resolution order:
    /// 1. GITHUB_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(id) = std::env::var("GITHUB_CLIENT_ID") {
            self.github.client_id = id;
        }
        if let Ok(uri) = std::env::var("GITHUB_REDIRECT_URI") {
            self.github.redirect_uri = uri;
        }
        if let Ok(url) = std::env::var("FRONTEND_URL") {
            self.frontend.url = url;
        }
        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            self.server.listen_addr = addr.parse().map_err(|e| {
                common::Error::Config(format!("LISTEN_ADDR is not a socket address: {e}"))
            })?;
        }

        if let Ok(secret) = std::env::var("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = self.github.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                self.github.client_secret = Some(Secret::new(secret));
            }
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        for (name, value) in [
            ("github.redirect_uri", &self.github.redirect_uri),
            ("github.authorize_url", &self.github.authorize_url),
            ("github.token_url", &self.github.token_url),
            ("github.api_url", &self.github.api_url),
            ("frontend.url", &self.frontend.url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {value}"
                )));
            }
        }

        if self.github.timeout_secs == 0 {
            return Err(common::Error::Config(
                "github.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.github.max_repo_pages == 0 {
            return Err(common::Error::Config(
                "github.max_repo_pages must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }
        if self.session.state_ttl_secs == 0 {
            return Err(common::Error::Config(
                "session.state_ttl_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg, CONFIG_PATH env var, or the
    /// default file name if it exists in the working directory.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }

    /// Whether both halves of the OAuth client registration are present.
    pub fn has_client_credentials(&self) -> bool {
        !self.github.client_id.is_empty()
            && self
                .github
                .client_secret
                .as_ref()
                .is_some_and(|s| !s.is_empty())
    }

    pub fn github_settings(&self) -> GitHubSettings {
        GitHubSettings {
            client_id: self.github.client_id.clone(),
            client_secret: self
                .github
                .client_secret
                .clone()
                .unwrap_or_else(|| Secret::new(String::new())),
            redirect_uri: self.github.redirect_uri.clone(),
            authorize_url: self.github.authorize_url.clone(),
            token_url: self.github.token_url.clone(),
            api_url: self.github.api_url.clone(),
            max_repo_pages: self.github.max_repo_pages,
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.github.timeout_secs)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.session.state_ttl_secs)
    }

    /// Browser origins (scheme, host, port) allowed by CORS: the frontend's
    /// first, then configured extras, without duplicates.
    ///
    /// Any path on the configured URLs is dropped since an `Origin` header
    /// never carries one.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::new();
        for raw in std::iter::once(&self.frontend.url).chain(self.server.cors_origins.iter()) {
            let origin = match Url::parse(raw) {
                Ok(url) => url.origin().ascii_serialization(),
                Err(_) => raw.trim_end_matches('/').to_string(),
            };
            if !origins.contains(&origin) {
                origins.push(origin);
            }
        }
        origins
    }
}
