//! Liveness probe handler.

/// Handler for GET /isalive
///
/// Always answers `ok\n`, independent of the auth configuration and of
/// whatever credentials the caller sent.
pub async fn is_alive() -> &'static str {
    "ok\n"
}
