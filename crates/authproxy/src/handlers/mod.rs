//! HTTP request handlers for authproxy.

pub mod health;
pub mod metrics;

pub use health::is_alive;
pub use metrics::metrics_handler;
