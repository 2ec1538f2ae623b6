//! Builder patterns for test claim sets
//!
//! Provides a fluent API for the claims a test token carries.

use chrono::{Duration, Utc};
use serde_json::{Map, Value};

/// Builder for test JWT claims
///
/// Defaults to a token issued now and expiring in one hour, with no issuer,
/// audience or `nbf`.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .issuer("https://issuer.test")
///     .audience("my-backend")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::from("test-subject"));
        claims.insert("iat".to_string(), Value::from(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            Value::from((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    pub fn subject(self, sub: &str) -> Self {
        self.claim("sub", sub)
    }

    pub fn issuer(self, iss: &str) -> Self {
        self.claim("iss", iss)
    }

    pub fn audience(self, aud: &str) -> Self {
        self.claim("aud", aud)
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", (Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.claim("nbf", (Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set issued-at in seconds from now (positive for the future)
    pub fn issued_in(self, seconds: i64) -> Self {
        self.claim("iat", (Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set an arbitrary claim
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    /// Remove a claim
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::new().build();
        assert_eq!(claims["sub"], "test-subject");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
        assert!(claims.get("iss").is_none());
    }

    #[test]
    fn test_builder_sets_and_removes_claims() {
        let claims = TestTokenBuilder::new()
            .issuer("https://issuer.test")
            .audience("backend")
            .claim("email", "alice@example.com")
            .without("exp")
            .build();

        assert_eq!(claims["iss"], "https://issuer.test");
        assert_eq!(claims["aud"], "backend");
        assert_eq!(claims["email"], "alice@example.com");
        assert!(claims.get("exp").is_none());
    }
}
