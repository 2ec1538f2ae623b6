//! Pre-shared key provider.

use super::{credential, AuthError, AuthGate, AuthProvider, Authenticator};
use crate::errors::AuthRejection;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Admits requests whose header carries the pre-shared key.
///
/// The header value may be prefixed with `Bearer ` and padded with
/// whitespace. The key itself never appears in `Debug` output or logs.
#[derive(Debug)]
pub struct PskAuth {
    header: HeaderName,
    secret: SecretString,
}

impl PskAuth {
    /// # Errors
    ///
    /// Returns `AuthError` when the header name is invalid or either
    /// argument is empty.
    pub fn new(header: &str, secret: SecretString) -> Result<Self, AuthError> {
        if header.trim().is_empty() {
            return Err(AuthError::EmptyParameter("token header"));
        }
        if secret.expose_secret().trim().is_empty() {
            return Err(AuthError::EmptyParameter("pre-shared key"));
        }
        let header = HeaderName::from_bytes(header.trim().as_bytes())
            .map_err(|_| AuthError::InvalidHeaderName(header.to_string()))?;

        Ok(Self { header, secret })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

#[async_trait]
impl AuthProvider for PskAuth {
    fn name(&self) -> &'static str {
        "key"
    }

    async fn gate(&self) -> Result<AuthGate, AuthError> {
        let authenticator = PskAuthenticator {
            header: self.header.clone(),
            secret: SecretString::from(self.secret.expose_secret().trim().to_string()),
        };
        Ok(AuthGate::new(self.name(), Arc::new(authenticator)))
    }
}

struct PskAuthenticator {
    header: HeaderName,
    /// Already trimmed.
    secret: SecretString,
}

impl Authenticator for PskAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthRejection> {
        let presented = credential(headers, &self.header)?;

        // Plain equality
        if presented != self.secret.expose_secret() {
            tracing::debug!(
                target: "authproxy.auth.psk",
                header = %self.header,
                "Header has invalid key"
            );
            return Err(AuthRejection::InvalidSecret);
        }
        Ok(())
    }
}
