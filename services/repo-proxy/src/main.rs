//! GitHub repository proxy
//!
//! Single-binary Rust service that:
//! 1. Runs the GitHub OAuth authorization-code grant for a browser frontend
//! 2. Keeps one bearer token per authorized GitHub account
//! 3. Proxies repository listing and file reads on that account's behalf

mod config;
mod error;
mod flow;
mod gateway;
mod metrics;
mod routes;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use session::{CredentialStore, PendingAuthRegistry};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

/// Upper bound on waiting for in-flight requests after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting github-repo-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no configuration file, using defaults and environment"),
    }

    let config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config from environment".to_string(),
    })?;

    info!(
        listen_addr = %config.server.listen_addr,
        redirect_uri = %config.github.redirect_uri,
        frontend_url = %config.frontend.url,
        api_url = %config.github.api_url,
        "configuration loaded"
    );

    if !config.has_client_credentials() {
        warn!("GitHub client id or secret not set; authorization callbacks will fail");
    }

    let http = github::http_client(&config.github.user_agent, config.upstream_timeout())
        .context("failed to build HTTP client")?;
    let provider: Arc<dyn provider::Provider> =
        Arc::new(github::GitHubProvider::new(http, config.github_settings()));

    let pending = Arc::new(PendingAuthRegistry::new(config.state_ttl()));
    let credentials = match &config.session.credentials_path {
        Some(path) => {
            let store = CredentialStore::load(path.clone())
                .await
                .with_context(|| format!("failed to load credentials from {}", path.display()))?;
            info!(
                path = %path.display(),
                sessions = store.len().await,
                "credential store loaded"
            );
            store
        }
        None => CredentialStore::in_memory(),
    };

    let app_state = AppState::new(
        provider,
        pending,
        Arc::new(credentials),
        &config.frontend.url,
        prometheus_handle,
    );
    let in_flight = app_state.metrics.in_flight.clone();

    let app = build_router(
        app_state,
        config.server.max_connections,
        &config.cors_origins(),
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
