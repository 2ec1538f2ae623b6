//! HTTP routes for authproxy.
//!
//! Defines the request pipeline and application state.

use crate::auth::AuthGate;
use crate::handlers;
use crate::middleware::{attach_request_context, http_metrics_middleware, request_log};
use crate::proxy::{proxy_handler, ReverseProxy};
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

/// Application state shared by the request pipeline.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Reverse proxy to the configured upstream.
    pub proxy: Arc<ReverseProxy>,

    /// Authentication gate of the selected provider.
    pub auth_gate: AuthGate,
}

/// Build the main router.
///
/// - `GET /isalive` - liveness probe, no authentication
/// - everything else (including non-GET `/isalive`) - auth gate, then reverse proxy
pub fn build_routes(state: AppState) -> Router {
    let proxied = state.auth_gate.wrap(
        Router::new()
            .fallback(proxy_handler)
            .with_state(Arc::clone(&state.proxy)),
    );

    // Layer order (bottom-to-top execution):
    // 1. attach_request_context - per-request context for the proxy (innermost)
    // 2. CatchPanicLayer - convert panics to 500
    // 3. request_log - request/response log lines with correlation id
    // 4. http_metrics_middleware - record ALL responses (outermost)
    Router::new()
        .route(
            "/isalive",
            get(handlers::is_alive).fallback_service(proxied.clone()),
        )
        .fallback_service(proxied)
        .layer(middleware::from_fn(attach_request_context))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(request_log))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// Build the router served on the metrics listener.
pub fn build_metrics_routes(metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(target: "authproxy.routes", error = %detail, "Panic while handling request");

    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
