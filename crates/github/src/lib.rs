//! GitHub implementation of the upstream provider contract
//!
//! Covers the OAuth web application flow (authorization URL, code exchange)
//! and the authenticated REST reads the repository gateway proxies. The
//! crate has no dependency on the service binary; everything goes through
//! `provider::Provider`.
//!
//! Flow:
//! 1. `authorize::build_authorization_url()` with a state from the session registry
//! 2. GitHub redirects back with `code` + `state`
//! 3. `token::exchange_code()` trades the code for a bearer token
//! 4. `api::fetch_profile()` resolves the numeric user id
//! 5. `api::list_repositories()`, `api::get_contents()` serve the gateway

pub mod api;
pub mod authorize;
pub mod client;
pub mod constants;
pub mod link;
pub mod token;

#[cfg(test)]
mod test_support;

pub use authorize::build_authorization_url;
pub use client::{GitHubProvider, GitHubSettings, http_client};
pub use constants::*;
pub use token::{TokenResponse, exchange_code};
