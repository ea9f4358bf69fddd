//! OAuth authorization-code exchange
//!
//! GitHub's token endpoint answers form-encoded by default; we ask for JSON.
//! A rejected code still comes back as HTTP 200 with an `error` field and no
//! `access_token`, so success requires both a 2xx status and a token.

use common::Secret;
use provider::{Result, UpstreamError};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use crate::client::GitHubSettings;

/// Response from the token endpoint.
///
/// Every field is optional because the error shape shares the 200 status.
#[derive(Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Take the bearer token, or describe why there is none.
    pub fn into_token(self) -> Result<Secret<String>> {
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(Secret::new(token)),
            _ => {
                let reason = match (self.error, self.error_description) {
                    (Some(code), Some(description)) => format!("{code}: {description}"),
                    (Some(code), None) => code,
                    _ => "no access token received".to_string(),
                };
                Err(UpstreamError::TokenExchange(reason))
            }
        }
    }
}

/// Exchange an authorization code for a bearer token.
///
/// Posts client id, client secret, code, and redirect target. The client
/// secret only ever leaves the process in this request body.
pub async fn exchange_code(
    client: &reqwest::Client,
    settings: &GitHubSettings,
    code: &str,
) -> Result<Secret<String>> {
    let response = client
        .post(&settings.token_url)
        .header(ACCEPT, "application/json")
        .form(&[
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.expose().as_str()),
            ("code", code),
            ("redirect_uri", settings.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| UpstreamError::TokenExchange(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(UpstreamError::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token_response = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| UpstreamError::TokenExchange(format!("invalid token response: {e}")))?;

    debug!(
        token_type = token_response.token_type.as_deref().unwrap_or("unknown"),
        scope = token_response.scope.as_deref().unwrap_or(""),
        "token endpoint answered"
    );
    token_response.into_token()
}
