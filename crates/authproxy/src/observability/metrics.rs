//! Metrics definitions for authproxy.
//!
//! All metrics follow Prometheus naming conventions:
//! - `authproxy_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `endpoint`: `/isalive` or `/proxied`
//! - `provider`: 4 values (iap, jwt, key, no-op)
//! - `outcome`/`status`: a handful of fixed strings
//! - `reason`: bounded by `AuthRejection` variants

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by the
/// `/metrics` endpoint.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("authproxy_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("authproxy_upstream".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set upstream buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("authproxy_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `authproxy_http_requests_total`, `authproxy_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code` / `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("authproxy_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("authproxy_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        401 | 403 => "denied",
        499 => "canceled",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Everything but the liveness probe is proxied, so two labels suffice.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/isalive" => "/isalive",
        _ => "/proxied",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record an authentication decision
///
/// Metric: `authproxy_auth_decisions_total`
/// Labels: `provider`, `outcome` (allow/deny), `reason`
pub fn record_auth_decision(provider: &'static str, outcome: &'static str, reason: &'static str) {
    counter!("authproxy_auth_decisions_total",
        "provider" => provider,
        "outcome" => outcome,
        "reason" => reason
    )
    .increment(1);
}

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Record a forwarding attempt
///
/// Metric: `authproxy_upstream_requests_total`, `authproxy_upstream_duration_seconds`
/// Labels: `outcome` (success/canceled/error)
pub fn record_upstream_request(outcome: &'static str, duration: Duration) {
    histogram!("authproxy_upstream_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());

    counter!("authproxy_upstream_requests_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWKS fetch or refresh
///
/// Metric: `authproxy_jwks_refresh_total`, `authproxy_jwks_refresh_duration_seconds`
/// Labels: `status` (success/error)
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("authproxy_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("authproxy_jwks_refresh_total", "status" => status).increment(1);
}

/// Number of usable keys in the current JWKS snapshot
///
/// Metric: `authproxy_jwks_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_jwks_keys(count: usize) {
    gauge!("authproxy_jwks_keys").set(count as f64);
}
