//! Generic JWKS-JWT provider.
//!
//! Tokens are read from a configurable header (default `Authorization`),
//! verified against a [`JwksCache`] snapshot and checked against a
//! [`ClaimPolicy`].
//!
//! # Security
//!
//! - Tokens are size-checked before parsing
//! - The header's `alg` must match the algorithm declared by the key
//! - `exp` and `nbf` are checked with a symmetric 5 s leeway, `iat` may not be
//!   more than 5 s in the future
//! - Rejection causes are logged at debug level only

use super::claims::ClaimPolicy;
use super::jwks::{JwksCache, DEFAULT_REFRESH_INTERVAL};
use super::{credential, AuthError, AuthGate, AuthProvider, Authenticator};
use crate::errors::AuthRejection;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderName};
use common::jwt::{check_token_size, validate_iat, JWT_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Verified claim set of a token.
pub type Claims = Map<String, Value>;

/// Signature and time-window verification shared by the JWT providers.
pub(crate) struct TokenVerifier {
    cache: Arc<JwksCache>,
    /// Leeway for `exp`/`nbf`, in seconds.
    leeway: u64,
    /// Registered claims that must be present.
    required: &'static [&'static str],
}

impl TokenVerifier {
    pub(crate) fn new(
        cache: Arc<JwksCache>,
        leeway: Duration,
        required: &'static [&'static str],
    ) -> Self {
        Self {
            cache,
            leeway: leeway.as_secs(),
            required,
        }
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience and issuer are checked by the providers
        validation.validate_aud = false;
        validation.required_spec_claims = self.required.iter().map(|c| (*c).to_string()).collect();
        validation
    }

    /// Verify signature and time window, returning the claim set.
    ///
    /// Never waits for a key refresh: an unknown key id only requests one.
    pub(crate) fn verify(&self, token: &str) -> Result<Claims, AuthRejection> {
        check_token_size(token)?;

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "authproxy.auth.jwt", error = %e, "Failed to parse token header");
            AuthRejection::Malformed
        })?;

        let key_set = self.cache.snapshot();

        let candidates: Vec<_> = match header.kid.as_deref() {
            Some(kid) => {
                let Some(key) = key_set.find(kid) else {
                    tracing::debug!(target: "authproxy.auth.jwt", kid = %kid, "Key not found in JWKS");
                    self.cache.request_refresh();
                    return Err(AuthRejection::UnknownKey);
                };
                if key.algorithm().is_some_and(|alg| alg != header.alg) {
                    tracing::debug!(
                        target: "authproxy.auth.jwt",
                        kid = %kid,
                        token_alg = ?header.alg,
                        key_alg = ?key.algorithm(),
                        "Token algorithm does not match key"
                    );
                    return Err(AuthRejection::KeyMismatch);
                }
                vec![key]
            }
            None => key_set
                .keys()
                .iter()
                .filter(|key| key.algorithm().map_or(true, |alg| alg == header.alg))
                .collect(),
        };

        if candidates.is_empty() {
            tracing::debug!(target: "authproxy.auth.jwt", alg = ?header.alg, "No key in JWKS for token algorithm");
            return Err(AuthRejection::UnknownKey);
        }

        let validation = self.validation(header.alg);
        let mut rejection = AuthRejection::SignatureMismatch;
        for key in candidates {
            match decode::<Claims>(token, key.decoding_key(), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    tracing::debug!(
                        target: "authproxy.auth.jwt",
                        kid = ?key.kid(),
                        error = %e,
                        "Token verification failed"
                    );
                    rejection = rejection_for(e.kind());
                    // Keep trying other keys only when this one simply did not verify
                    if !matches!(
                        rejection,
                        AuthRejection::SignatureMismatch | AuthRejection::KeyMismatch
                    ) {
                        return Err(rejection);
                    }
                }
            }
        }
        Err(rejection)
    }
}

fn rejection_for(kind: &ErrorKind) -> AuthRejection {
    match kind {
        ErrorKind::ExpiredSignature => AuthRejection::Expired,
        ErrorKind::ImmatureSignature => AuthRejection::NotYetValid,
        ErrorKind::InvalidSignature => AuthRejection::SignatureMismatch,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => AuthRejection::KeyMismatch,
        ErrorKind::InvalidIssuer => AuthRejection::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthRejection::InvalidAudience,
        _ => AuthRejection::Malformed,
    }
}

/// Reject tokens whose `iat` lies further in the future than `skew`.
///
/// A missing `iat` is accepted; a non-numeric one is malformed.
pub(crate) fn check_issued_at(claims: &Claims, skew: Duration) -> Result<(), AuthRejection> {
    let Some(iat) = claims.get("iat") else {
        return Ok(());
    };
    #[allow(clippy::cast_possible_truncation)]
    let iat = iat
        .as_i64()
        .or_else(|| iat.as_f64().map(|f| f as i64))
        .ok_or(AuthRejection::Malformed)?;
    validate_iat(iat, skew)?;
    Ok(())
}

/// Generic JWKS-JWT provider.
#[derive(Debug, Clone)]
pub struct JwtAuth {
    header: HeaderName,
    jwks_url: String,
    policy: ClaimPolicy,
    refresh_interval: Duration,
}

impl JwtAuth {
    /// # Errors
    ///
    /// Returns `AuthError` when the header name is invalid, the JWKS URL is
    /// empty or the claim policy is empty.
    pub fn new(
        header: Option<&str>,
        jwks_url: impl Into<String>,
        policy: ClaimPolicy,
    ) -> Result<Self, AuthError> {
        let header = match header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(name) => HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| AuthError::InvalidHeaderName(name.to_string()))?,
            None => AUTHORIZATION,
        };

        let jwks_url = jwks_url.into();
        if jwks_url.trim().is_empty() {
            return Err(AuthError::EmptyParameter("jwks url"));
        }
        if policy.is_empty() {
            return Err(AuthError::EmptyClaimPolicy);
        }

        Ok(Self {
            header,
            jwks_url,
            policy,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }
}

#[async_trait]
impl AuthProvider for JwtAuth {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn gate(&self) -> Result<AuthGate, AuthError> {
        let cache = JwksCache::fetch(&self.jwks_url, self.refresh_interval).await?;
        cache.spawn_refresh_task();

        let authenticator = JwtAuthenticator {
            header: self.header.clone(),
            verifier: TokenVerifier::new(cache, JWT_CLOCK_SKEW, &[]),
            policy: self.policy.clone(),
        };
        Ok(AuthGate::new(self.name(), Arc::new(authenticator)))
    }
}

struct JwtAuthenticator {
    header: HeaderName,
    verifier: TokenVerifier,
    policy: ClaimPolicy,
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthRejection> {
        let token = credential(headers, &self.header)?;
        let claims = self.verifier.verify(token)?;
        check_issued_at(&claims, JWT_CLOCK_SKEW)?;

        self.policy.check(&claims).map_err(|claim| {
            tracing::debug!(target: "authproxy.auth.jwt", claim = %claim, "Required claim mismatch");
            match claim.as_str() {
                "iss" => AuthRejection::InvalidIssuer,
                "aud" => AuthRejection::InvalidAudience,
                _ => AuthRejection::ClaimMismatch(claim),
            }
        })
    }
}
