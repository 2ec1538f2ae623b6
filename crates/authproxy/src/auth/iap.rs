//! Identity-Aware-Proxy JWT provider.
//!
//! Google's Identity-Aware Proxy signs an assertion for every request it
//! lets through and passes it in `x-goog-iap-jwt-assertion`. Verification:
//!
//! 1. Signature against the published IAP keys, `exp` without leeway
//! 2. `iat` at most 30 s in the future
//! 3. `iss` equals `https://cloud.google.com/iap`
//! 4. `aud` matches the configured audience

use super::claims::{audience_matches, issuer_matches};
use super::jwks::{JwksCache, DEFAULT_REFRESH_INTERVAL};
use super::jwt::{check_issued_at, TokenVerifier};
use super::{credential, AuthError, AuthGate, AuthProvider, Authenticator};
use crate::errors::AuthRejection;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};
use common::jwt::IAP_CLOCK_SKEW;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the IAP assertion.
pub const IAP_ASSERTION_HEADER: HeaderName = HeaderName::from_static("x-goog-iap-jwt-assertion");

/// Published IAP verification keys.
pub const IAP_JWKS_URL: &str = "https://www.gstatic.com/iap/verify/public_key-jwk";

/// Issuer of IAP assertions.
pub const IAP_ISSUER: &str = "https://cloud.google.com/iap";

/// Identity-Aware-Proxy provider.
#[derive(Debug, Clone)]
pub struct IapAuth {
    audience: String,
    jwks_url: String,
    issuer: String,
    refresh_interval: Duration,
}

impl IapAuth {
    /// # Errors
    ///
    /// Returns `AuthError::EmptyParameter` when the audience is empty.
    pub fn new(audience: impl Into<String>) -> Result<Self, AuthError> {
        let audience = audience.into();
        if audience.trim().is_empty() {
            return Err(AuthError::EmptyParameter("audience"));
        }
        Ok(Self {
            audience,
            jwks_url: IAP_JWKS_URL.to_string(),
            issuer: IAP_ISSUER.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        })
    }

    /// Override the key set URL.
    #[must_use]
    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = jwks_url.into();
        self
    }

    /// Override the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

#[async_trait]
impl AuthProvider for IapAuth {
    fn name(&self) -> &'static str {
        "iap"
    }

    async fn gate(&self) -> Result<AuthGate, AuthError> {
        let cache = JwksCache::fetch(&self.jwks_url, self.refresh_interval).await?;
        cache.spawn_refresh_task();

        let authenticator = IapAuthenticator {
            verifier: TokenVerifier::new(cache, Duration::ZERO, &["exp"]),
            issuer: Value::String(self.issuer.clone()),
            audience: Value::String(self.audience.clone()),
        };
        Ok(AuthGate::new(self.name(), Arc::new(authenticator)))
    }
}

struct IapAuthenticator {
    verifier: TokenVerifier,
    issuer: Value,
    audience: Value,
}

impl Authenticator for IapAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthRejection> {
        let token = credential(headers, &IAP_ASSERTION_HEADER)?;
        let claims = self.verifier.verify(token)?;

        check_issued_at(&claims, IAP_CLOCK_SKEW).map_err(|e| {
            tracing::debug!(target: "authproxy.auth.iap", "JWT token is in the future");
            e
        })?;

        if !issuer_matches(&claims, &self.issuer) {
            tracing::debug!(target: "authproxy.auth.iap", "Invalid JWT token issuer");
            return Err(AuthRejection::InvalidIssuer);
        }

        if !audience_matches(&claims, &self.audience) {
            tracing::debug!(target: "authproxy.auth.iap", "Invalid JWT token audience");
            return Err(AuthRejection::InvalidAudience);
        }

        Ok(())
    }
}
