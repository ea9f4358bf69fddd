//! GitHub OAuth and REST constants
//!
//! Endpoint defaults for github.com. All three URLs can be overridden in
//! configuration (GitHub Enterprise Server, or a local stub in tests).

/// Authorization endpoint the end user is redirected to
pub const AUTHORIZE_ENDPOINT: &str = "https://github.com/login/oauth/authorize";

/// Token endpoint for the authorization-code exchange
pub const TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";

/// REST API root
pub const API_BASE_URL: &str = "https://api.github.com";

/// `repo` grants read access to private repositories, `user` to the profile.
pub const SCOPES: &str = "repo user";

/// Media type for REST responses
pub const GITHUB_JSON: &str = "application/vnd.github+json";

/// Pinned REST API version header value
pub const API_VERSION: &str = "2022-11-28";

/// GitHub rejects API requests without a User-Agent.
pub const DEFAULT_USER_AGENT: &str = "github-repo-proxy";
