//! Authentication providers.
//!
//! A provider is selected once at startup and produces an [`AuthGate`]: a
//! wrapper that puts an authentication check in front of a router. Four
//! providers exist:
//!
//! - [`NoOpAuth`]: admits every request unchanged
//! - [`PskAuth`]: compares a header against a pre-shared key
//! - [`IapAuth`]: verifies Identity-Aware-Proxy assertions
//! - [`JwtAuth`]: verifies JWTs against a remote JWKS and a claim policy
//!
//! Authentication state derives solely from the current request's headers.

pub mod claims;
pub mod iap;
pub mod jwks;
pub mod jwt;
pub mod psk;

pub use claims::{ClaimPolicy, ClaimPolicyError};
pub use iap::IapAuth;
pub use jwks::{JwksCache, JwksError, KeySet};
pub use jwt::JwtAuth;
pub use psk::PskAuth;

use crate::errors::AuthRejection;
use crate::middleware::{require_auth, AuthState};
use async_trait::async_trait;
use axum::{http::HeaderMap, middleware, Router};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while constructing a provider or its gate.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("{0} must not be empty")]
    EmptyParameter(&'static str),

    #[error("required claim policy must not be empty")]
    EmptyClaimPolicy,

    #[error(transparent)]
    Jwks(#[from] JwksError),
}

/// Capability shared by every provider: produce a request gate.
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// Short provider name, used as a metric label.
    fn name(&self) -> &'static str;

    /// Build the gate. JWKS-backed providers perform their initial key fetch here.
    async fn gate(&self) -> Result<AuthGate, AuthError>;
}

/// Per-request credential check.
pub trait Authenticator: Send + Sync {
    /// Admit (`Ok`) or reject the request, looking only at its headers.
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthRejection>;
}

/// Authentication gate produced by a provider.
#[derive(Clone)]
pub struct AuthGate {
    provider: &'static str,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl AuthGate {
    pub fn new(provider: &'static str, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            provider,
            authenticator: Some(authenticator),
        }
    }

    /// A gate that admits everything.
    pub fn open(provider: &'static str) -> Self {
        Self {
            provider,
            authenticator: None,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Put the gate in front of `router`.
    ///
    /// An open gate returns the router unchanged.
    pub fn wrap(&self, router: Router) -> Router {
        match &self.authenticator {
            None => router,
            Some(authenticator) => {
                let state = Arc::new(AuthState {
                    provider: self.provider,
                    authenticator: Arc::clone(authenticator),
                });
                router.layer(middleware::from_fn_with_state(state, require_auth))
            }
        }
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("provider", &self.provider)
            .field("open", &self.authenticator.is_none())
            .finish()
    }
}

/// Provider that admits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuth;

#[async_trait]
impl AuthProvider for NoOpAuth {
    fn name(&self) -> &'static str {
        "no-op"
    }

    async fn gate(&self) -> Result<AuthGate, AuthError> {
        Ok(AuthGate::open(self.name()))
    }
}

/// Read a header as a bearer credential: strip `Bearer `, trim.
///
/// Returns `MissingToken` when the header is absent or empty after trimming.
pub(crate) fn credential<'a>(
    headers: &'a HeaderMap,
    name: &axum::http::HeaderName,
) -> Result<&'a str, AuthRejection> {
    let Some(value) = headers.get(name) else {
        return Err(AuthRejection::MissingToken);
    };
    let value = value.to_str().map_err(|_| AuthRejection::Malformed)?;
    let token = common::jwt::bearer_token(value);
    if token.is_empty() {
        return Err(AuthRejection::MissingToken);
    }
    Ok(token)
}
