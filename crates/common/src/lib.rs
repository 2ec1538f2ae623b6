//! Common utilities shared across authproxy crates.

#![warn(clippy::pedantic)]

/// Module for bearer-token and JWT helpers (size limits, clock skew, `iat`)
pub mod jwt;
