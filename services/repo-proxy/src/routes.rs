//! HTTP surface: routing, request tracking, CORS
//!
//! Handlers are thin. They parse the path and query, call into
//! `AuthorizationFlow` or `ProxyGateway`, and let `ApiError` render failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, HeaderName};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{ContentLocation, Provider};
use serde::Deserialize;
use serde_json::{Value, json};
use session::{CredentialStore, PendingAuthRegistry, SubjectId};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{Instrument, info, info_span, warn};

use crate::error::ApiError;
use crate::flow::{AuthorizationFlow, AuthorizationRequest};
use crate::gateway::{FileResponse, ProxyGateway};
use crate::metrics::{self, ServiceMetrics};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthorizationFlow>,
    pub gateway: Arc<ProxyGateway>,
    pub pending: Arc<PendingAuthRegistry>,
    pub credentials: Arc<CredentialStore>,
    pub provider: Arc<dyn Provider>,
    pub metrics: ServiceMetrics,
    pub prometheus: PrometheusHandle,
    /// Where a completed callback redirects, without trailing slash
    pub frontend_url: String,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn Provider>,
        pending: Arc<PendingAuthRegistry>,
        credentials: Arc<CredentialStore>,
        frontend_url: &str,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            flow: Arc::new(AuthorizationFlow::new(
                provider.clone(),
                pending.clone(),
                credentials.clone(),
            )),
            gateway: Arc::new(ProxyGateway::new(provider.clone(), credentials.clone())),
            pending,
            credentials,
            provider,
            metrics: ServiceMetrics::new(),
            prometheus,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrent requests; `cors_origins` are the
/// browser origins allowed to call the API with credentials.
pub fn build_router(state: AppState, max_connections: usize, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/auth/github", get(begin_authorization))
        .route("/auth/github/callback", get(authorization_callback))
        .route("/user/{id}", delete(revoke))
        .route("/user/{id}/info", get(user_info))
        .route("/user/{id}/repos", get(list_repositories))
        .route("/user/{id}/repo/{owner}/{repo}/contents", get(list_contents))
        .route("/user/{id}/repo/{owner}/{repo}/file", get(get_file))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_requests,
        ))
        .layer(cors_layer(cors_origins))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "skipping invalid CORS origin");
                None
            }
        })
        .collect();

    // Credentialed CORS rules out wildcards, so headers and methods are listed.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([REQUEST_ID])
}

/// Decrements the in-flight gauge when the request finishes, however it ends.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Per-request id, span, counters and duration histogram.
async fn track_requests(
    State(service): State<ServiceMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let span = info_span!("request", request_id = %request_id, method = %method, route = %route);

    service.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&service.in_flight);
    let started = Instant::now();

    let mut response = async move {
        let response = next.run(request).await;
        info!(
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        response
    }
    .instrument(span)
    .await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        service.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    metrics::record_request(
        status.as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// Path ids that are not numbers can never name a stored credential.
fn subject(raw: &str) -> Result<SubjectId, ApiError> {
    raw.parse().map_err(|_| ApiError::Unauthenticated)
}

async fn begin_authorization(State(state): State<AppState>) -> Json<AuthorizationRequest> {
    Json(state.flow.begin_authorization().await)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn authorization_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, ApiError> {
    let Some(auth_state) = params.state.as_deref() else {
        metrics::record_authorization(ApiError::InvalidState.kind());
        return Err(ApiError::InvalidState);
    };

    let subject_id = match (params.code.as_deref(), params.error.as_deref()) {
        (Some(code), _) => state.flow.complete_authorization(code, auth_state).await?,
        (None, Some(error)) => return Err(state.flow.deny_authorization(auth_state, error).await),
        (None, None) => {
            return Err(state
                .flow
                .deny_authorization(auth_state, "callback carried no authorization code")
                .await);
        }
    };

    Ok(Redirect::temporary(&format!(
        "{}/?user_id={subject_id}",
        state.frontend_url
    )))
}

async fn user_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.gateway.user_info(subject(&id)?).await?))
}

async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.flow.revoke(subject(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_repositories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.gateway.list_repositories(subject(&id)?).await?))
}

#[derive(Debug, Default, Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

async fn list_contents(
    State(state): State<AppState>,
    Path((id, owner, repo)): Path<(String, String, String)>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Value>, ApiError> {
    let location = ContentLocation::new(owner, repo, query.path);
    Ok(Json(
        state.gateway.list_contents(subject(&id)?, &location).await?,
    ))
}

async fn get_file(
    State(state): State<AppState>,
    Path((id, owner, repo)): Path<(String, String, String)>,
    Query(query): Query<PathQuery>,
) -> Result<Json<FileResponse>, ApiError> {
    let location = ContentLocation::new(owner, repo, query.path);
    Ok(Json(state.gateway.get_file(subject(&id)?, &location).await?))
}

/// Service status. 200 when the provider is configured, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let provider = state.provider.health();
    let status_code = if provider.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if status_code == StatusCode::OK { "healthy" } else { "degraded" },
        "provider": {
            "id": state.provider.id(),
            "status": provider.status,
            "detail": provider.detail,
        },
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "in_flight": state.metrics.in_flight.load(Ordering::Relaxed),
        "pending_authorizations": state.pending.len().await,
        "stored_sessions": state.credentials.len().await,
        "persistent_sessions": state.credentials.is_persistent(),
    });

    (status_code, Json(body))
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
