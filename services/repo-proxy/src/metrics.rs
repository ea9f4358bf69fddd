//! Prometheus metrics exposition
//!
//! - `proxy_requests_total` (counter): labels `status`, `method`
//! - `proxy_request_duration_seconds` (histogram): label `status`
//! - `proxy_upstream_errors_total` (counter): label `error_type`
//! - `auth_completions_total` (counter): label `outcome`
//!
//! Plus in-process atomics for the /health endpoint.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 5ms to 60s, covering the upstream timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("proxy_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .expect("bucket list is non-empty")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))
}

/// Handle backed by a recorder that is not installed globally, for tests.
#[cfg(test)]
pub fn test_handle() -> PrometheusHandle {
    builder().build_recorder().handle()
}

/// Record a completed request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("proxy_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record an upstream failure with a classification label.
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("proxy_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

/// Record how an authorization callback ended ("success" or an error kind).
pub fn record_authorization(outcome: &str) {
    metrics::counter!("auth_completions_total", "outcome" => outcome.to_string()).increment(1);
}

/// Counters surfaced on /health
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
