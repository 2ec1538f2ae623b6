//! HTTP middleware for authproxy.

pub mod auth;
pub mod context;
pub mod http_metrics;
pub mod request_log;

pub use auth::{require_auth, AuthState};
pub use context::{attach_request_context, RequestContext};
pub use http_metrics::http_metrics_middleware;
pub use request_log::request_log;
