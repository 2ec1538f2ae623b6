//! Request-scoped context.
//!
//! [`RequestContext`] travels in request extensions and carries what the
//! reverse proxy needs from earlier layers: an optional access token to
//! inject upstream and the request's cancellation signal.

use axum::{extract::Request, middleware::Next, response::Response};
use secrecy::SecretString;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Per-request data made available to the reverse proxy.
#[derive(Clone, Default)]
pub struct RequestContext {
    access_token: Option<SecretString>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an access token; the proxy sends it upstream as
    /// `authorization: Bearer <token>`.
    #[must_use]
    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Make sure every request carries a [`RequestContext`].
///
/// The context's cancellation token fires if the request future is dropped
/// before completion (client went away).
pub async fn attach_request_context(mut req: Request, next: Next) -> Response {
    let ctx = match req.extensions().get::<RequestContext>() {
        Some(ctx) => ctx.clone(),
        None => {
            let ctx = RequestContext::new();
            req.extensions_mut().insert(ctx.clone());
            ctx
        }
    };

    let guard = ctx.cancellation.clone().drop_guard();
    let response = next.run(req).await;
    guard.disarm();
    response
}
