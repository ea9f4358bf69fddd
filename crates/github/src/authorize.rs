//! Authorization endpoint URL construction
//!
//! The end user's browser is sent to this URL. GitHub echoes `state` back on
//! the callback unchanged, which is what the session registry checks.

use crate::client::GitHubSettings;
use crate::constants::SCOPES;

/// Build the full authorization URL with all required OAuth parameters.
///
/// Query values are percent-encoded. Falls back to plain concatenation only
/// if the configured endpoint is not a parseable URL, in which case the
/// browser redirect will fail visibly.
pub fn build_authorization_url(settings: &GitHubSettings, state: &str) -> String {
    let params = [
        ("client_id", settings.client_id.as_str()),
        ("redirect_uri", settings.redirect_uri.as_str()),
        ("scope", SCOPES),
        ("state", state),
        ("allow_signup", "true"),
    ];
    match reqwest::Url::parse_with_params(&settings.authorize_url, &params) {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::warn!(authorize_url = %settings.authorize_url, error = %e, "unparseable authorize_url");
            format!("{}?state={state}", settings.authorize_url)
        }
    }
}
