//! Prometheus metrics endpoint handler.
//!
//! Served on its own listener. Unauthenticated so Prometheus can scrape it;
//! labels carry only bounded operational data, never credentials.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE authproxy_http_requests_total counter
/// authproxy_http_requests_total{method="GET",endpoint="/isalive",status_code="200"} 42
/// ```
#[tracing::instrument(skip_all, name = "authproxy.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
