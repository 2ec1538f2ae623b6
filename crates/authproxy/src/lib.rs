//! authproxy library.
//!
//! An authenticating reverse proxy. Every inbound request (except the
//! liveness probe) passes through a pluggable authentication gate before it
//! is forwarded to a single configured upstream.
//!
//! Exposes modules for integration testing.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod proxy;
pub mod routes;
