//! Authentication gate middleware.
//!
//! Runs the selected provider's [`Authenticator`] against the request headers.
//! Denied requests end here with a 401; admitted requests continue unchanged.

use crate::auth::Authenticator;
use crate::errors::AuthRejection;
use crate::observability::metrics::record_auth_decision;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Provider name, for logs and metric labels.
    pub provider: &'static str,

    /// Credential check of the selected provider.
    pub authenticator: Arc<dyn Authenticator>,
}

/// Authentication middleware.
///
/// # Response
///
/// - Returns 401 Unauthorized if the credential is missing or invalid
/// - Continues to the next handler with the request untouched otherwise
#[instrument(skip_all, name = "authproxy.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    if let Err(rejection) = state.authenticator.authenticate(req.headers()) {
        tracing::debug!(
            target: "authproxy.middleware.auth",
            provider = state.provider,
            reason = rejection.reason(),
            error = %rejection,
            "Request rejected"
        );
        record_auth_decision(state.provider, "deny", rejection.reason());
        return Err(rejection);
    }

    record_auth_decision(state.provider, "allow", "ok");
    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{HeaderMap, Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    struct HeaderPresent;

    impl Authenticator for HeaderPresent {
        fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthRejection> {
            if headers.contains_key("x-let-me-in") {
                Ok(())
            } else {
                Err(AuthRejection::MissingToken)
            }
        }
    }

    fn test_app() -> Router {
        let state = Arc::new(AuthState {
            provider: "test",
            authenticator: Arc::new(HeaderPresent),
        });
        Router::new()
            .route("/", get(|| async { "inner" }))
            .layer(middleware::from_fn_with_state(state, require_auth))
    }

    #[test]
    fn test_auth_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AuthState>();
    }

    #[tokio::test]
    async fn test_rejected_request_gets_401() {
        let request = HttpRequest::builder()
            .uri("/")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler() {
        let request = HttpRequest::builder()
            .uri("/")
            .header("x-let-me-in", "1")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
