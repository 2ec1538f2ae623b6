//! authproxy configuration.
//!
//! Configuration is loaded from environment variables. The pre-shared key is
//! held as a `SecretString` and redacted in Debug output.

use crate::auth::{AuthProvider, ClaimPolicy, IapAuth, JwtAuth, NoOpAuth, PskAuth};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default main listener address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Default metrics listener address.
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "127.0.0.1:8081";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default upstream scheme.
pub const DEFAULT_UPSTREAM_SCHEME: &str = "https";

/// Default JWKS refresh interval in seconds (15 minutes).
pub const DEFAULT_JWKS_REFRESH_SECONDS: u64 = 900;

/// Maximum JWKS refresh interval in seconds (1 day).
pub const MAX_JWKS_REFRESH_SECONDS: u64 = 86_400;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// authproxy configuration.
#[derive(Clone)]
pub struct Config {
    /// Main listener address (default: "127.0.0.1:8080").
    pub bind_address: SocketAddr,

    /// Metrics listener address (default: "127.0.0.1:8081").
    pub metrics_bind_address: SocketAddr,

    /// Log level (default: "info").
    pub log_level: String,

    /// Upstream host, optionally with port.
    pub upstream_host: String,

    /// Upstream scheme, `http` or `https` (default: "https").
    pub upstream_scheme: String,

    /// Auth provider discriminator: iap, jwt, key or no-op.
    pub auth_provider: String,

    /// Expected audience (iap).
    pub auth_audience: String,

    /// Issuer override (iap).
    pub auth_issuer: String,

    /// JWKS URL (jwt, iap override).
    pub auth_jwks_url: String,

    /// Comma-separated `key=value` required claims (jwt).
    pub auth_required_claims: String,

    /// Header carrying the credential (key, jwt).
    pub auth_token_header: String,

    /// Pre-shared key (key).
    pub auth_pre_shared_key: Option<SecretString>,

    /// Interval between scheduled JWKS refreshes.
    pub jwks_refresh_interval: Duration,
}

/// Custom Debug implementation that redacts the pre-shared key.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("metrics_bind_address", &self.metrics_bind_address)
            .field("log_level", &self.log_level)
            .field("upstream_host", &self.upstream_host)
            .field("upstream_scheme", &self.upstream_scheme)
            .field("auth_provider", &self.auth_provider)
            .field("auth_audience", &self.auth_audience)
            .field("auth_issuer", &self.auth_issuer)
            .field("auth_jwks_url", &self.auth_jwks_url)
            .field("auth_required_claims", &self.auth_required_claims)
            .field("auth_token_header", &self.auth_token_header)
            .field(
                "auth_pre_shared_key",
                &self.auth_pre_shared_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jwks_refresh_interval", &self.jwks_refresh_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid upstream scheme: {0}")]
    InvalidUpstreamScheme(String),

    #[error("Invalid JWKS refresh configuration: {0}")]
    InvalidJwksRefresh(String),

    /// Auth provider selection failed. The message names the offending parameter.
    #[error("{0}")]
    InvalidAuth(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim().to_string()).unwrap_or_default();

        let bind_address = parse_socket_addr(vars, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?;
        let metrics_bind_address =
            parse_socket_addr(vars, "METRICS_BIND_ADDRESS", DEFAULT_METRICS_BIND_ADDRESS)?;

        let log_level = vars
            .get("LOG_LEVEL")
            .map_or_else(|| DEFAULT_LOG_LEVEL.to_string(), |v| v.trim().to_lowercase());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(format!(
                "LOG_LEVEL must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                log_level
            )));
        }

        let upstream_host = get("UPSTREAM_HOST");
        if upstream_host.is_empty() {
            return Err(ConfigError::MissingEnvVar("UPSTREAM_HOST".to_string()));
        }

        let upstream_scheme = vars.get("UPSTREAM_SCHEME").map_or_else(
            || DEFAULT_UPSTREAM_SCHEME.to_string(),
            |v| v.trim().to_lowercase(),
        );
        if upstream_scheme != "http" && upstream_scheme != "https" {
            return Err(ConfigError::InvalidUpstreamScheme(format!(
                "UPSTREAM_SCHEME must be 'http' or 'https', got '{upstream_scheme}'"
            )));
        }

        let jwks_refresh_seconds = if let Some(value_str) = vars.get("AUTH_JWKS_REFRESH_SECONDS") {
            let value: u64 = value_str.trim().parse().map_err(|e| {
                ConfigError::InvalidJwksRefresh(format!(
                    "AUTH_JWKS_REFRESH_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwksRefresh(
                    "AUTH_JWKS_REFRESH_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_JWKS_REFRESH_SECONDS {
                return Err(ConfigError::InvalidJwksRefresh(format!(
                    "AUTH_JWKS_REFRESH_SECONDS must not exceed {MAX_JWKS_REFRESH_SECONDS} seconds, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_JWKS_REFRESH_SECONDS
        };

        let auth_pre_shared_key = vars
            .get("AUTH_PRE_SHARED_KEY")
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone()));

        Ok(Config {
            bind_address,
            metrics_bind_address,
            log_level,
            upstream_host,
            upstream_scheme,
            auth_provider: get("AUTH_PROVIDER"),
            auth_audience: get("AUTH_AUDIENCE"),
            auth_issuer: get("AUTH_ISSUER"),
            auth_jwks_url: get("AUTH_JWKS_URL"),
            auth_required_claims: get("AUTH_REQUIRED_CLAIMS"),
            auth_token_header: get("AUTH_TOKEN_HEADER"),
            auth_pre_shared_key,
            jwks_refresh_interval: Duration::from_secs(jwks_refresh_seconds),
        })
    }

    /// Select and construct the auth provider.
    ///
    /// The discriminator is case-insensitive. Runs once at startup; any
    /// error is fatal.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAuth` naming the missing or malformed parameter.
    pub fn auth_provider(&self) -> Result<Box<dyn AuthProvider>, ConfigError> {
        let provider = self.auth_provider.to_lowercase();
        match provider.as_str() {
            "iap" => {
                if self.auth_audience.is_empty() {
                    return Err(invalid_auth("auth-audience must be set"));
                }
                let mut iap = IapAuth::new(self.auth_audience.clone())
                    .map_err(|e| invalid_auth(format!("creating IAP auth provider: {e}")))?
                    .with_refresh_interval(self.jwks_refresh_interval);
                if !self.auth_jwks_url.is_empty() {
                    iap = iap.with_jwks_url(self.auth_jwks_url.clone());
                }
                if !self.auth_issuer.is_empty() {
                    iap = iap.with_issuer(self.auth_issuer.clone());
                }
                Ok(Box::new(iap))
            }
            "jwt" => {
                if self.auth_jwks_url.is_empty() {
                    return Err(invalid_auth("auth-jwks-url must be set"));
                }
                if self.auth_required_claims.is_empty() {
                    return Err(invalid_auth("auth-required-claims must be set"));
                }
                let policy = ClaimPolicy::parse(&self.auth_required_claims).map_err(|e| {
                    invalid_auth(format!("auth-required-claims invalid format: {e}"))
                })?;
                let header = Some(self.auth_token_header.as_str()).filter(|h| !h.is_empty());
                let jwt = JwtAuth::new(header, self.auth_jwks_url.clone(), policy)
                    .map_err(|e| invalid_auth(format!("creating JWT auth provider: {e}")))?
                    .with_refresh_interval(self.jwks_refresh_interval);
                Ok(Box::new(jwt))
            }
            "key" => {
                let Some(secret) = &self.auth_pre_shared_key else {
                    return Err(invalid_auth("auth-pre-shared-key must be set"));
                };
                if self.auth_token_header.is_empty() {
                    return Err(invalid_auth("auth-token-header must be set"));
                }
                let psk = PskAuth::new(
                    &self.auth_token_header,
                    SecretString::from(secret.expose_secret().to_string()),
                )
                .map_err(|e| invalid_auth(format!("creating pre-shared key auth provider: {e}")))?;
                Ok(Box::new(psk))
            }
            "no-op" => Ok(Box::new(NoOpAuth)),
            other => Err(invalid_auth(format!("unknown auth-provider: {other}"))),
        }
    }
}

fn invalid_auth(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidAuth(message.into())
}

fn parse_socket_addr(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<SocketAddr, ConfigError> {
    let value = vars.get(name).map_or(default, |v| v.trim());
    value.parse().map_err(|e| {
        ConfigError::InvalidBindAddress(format!("{name} must be a socket address, got '{value}': {e}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "UPSTREAM_HOST".to_string(),
            "upstream.internal:8080".to_string(),
        )])
    }

    fn with(mut vars: HashMap<String, String>, pairs: &[(&str, &str)]) -> HashMap<String, String> {
        for (k, v) in pairs {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        vars
    }

    fn auth_error(vars: &HashMap<String, String>) -> String {
        let config = Config::from_vars(vars).expect("Config should load successfully");
        match config.auth_provider() {
            Ok(provider) => panic!("expected error, got provider {provider:?}"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.metrics_bind_address.to_string(), "127.0.0.1:8081");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.upstream_host, "upstream.internal:8080");
        assert_eq!(config.upstream_scheme, "https");
        assert!(config.auth_provider.is_empty());
        assert!(config.auth_pre_shared_key.is_none());
        assert_eq!(config.jwks_refresh_interval, Duration::from_secs(900));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = with(
            base_vars(),
            &[
                ("BIND_ADDRESS", "0.0.0.0:9000"),
                ("METRICS_BIND_ADDRESS", "0.0.0.0:9001"),
                ("LOG_LEVEL", "DEBUG"),
                ("UPSTREAM_SCHEME", "HTTP"),
                ("AUTH_PROVIDER", "jwt"),
                ("AUTH_JWKS_REFRESH_SECONDS", "60"),
            ],
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:9000");
        assert_eq!(config.metrics_bind_address.to_string(), "0.0.0.0:9001");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.upstream_scheme, "http");
        assert_eq!(config.auth_provider, "jwt");
        assert_eq!(config.jwks_refresh_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_from_vars_missing_upstream_host() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "UPSTREAM_HOST"));
    }

    #[test]
    fn test_from_vars_invalid_values() {
        let cases = [
            ("BIND_ADDRESS", "not-an-address"),
            ("METRICS_BIND_ADDRESS", "localhost"),
            ("LOG_LEVEL", "verbose"),
            ("UPSTREAM_SCHEME", "ftp"),
            ("AUTH_JWKS_REFRESH_SECONDS", "0"),
            ("AUTH_JWKS_REFRESH_SECONDS", "86401"),
            ("AUTH_JWKS_REFRESH_SECONDS", "soon"),
        ];
        for (name, value) in cases {
            let vars = with(base_vars(), &[(name, value)]);
            assert!(
                Config::from_vars(&vars).is_err(),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_pre_shared_key() {
        let vars = with(base_vars(), &[("AUTH_PRE_SHARED_KEY", "hunter2-secret")]);
        let config = Config::from_vars(&vars).unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    // -------------------------------------------------------------------------
    // Provider selection
    // -------------------------------------------------------------------------

    #[test]
    fn test_key_provider_requires_secret() {
        let vars = with(
            base_vars(),
            &[("AUTH_PROVIDER", "key"), ("AUTH_TOKEN_HEADER", "Authorization")],
        );
        assert_eq!(auth_error(&vars), "auth-pre-shared-key must be set");
    }

    #[test]
    fn test_key_provider_requires_header() {
        let vars = with(
            base_vars(),
            &[("AUTH_PROVIDER", "key"), ("AUTH_PRE_SHARED_KEY", "secret")],
        );
        assert_eq!(auth_error(&vars), "auth-token-header must be set");
    }

    #[test]
    fn test_key_provider_selected() {
        let vars = with(
            base_vars(),
            &[
                ("AUTH_PROVIDER", "KEY"),
                ("AUTH_PRE_SHARED_KEY", "secret"),
                ("AUTH_TOKEN_HEADER", "Authorization"),
            ],
        );
        let provider = Config::from_vars(&vars).unwrap().auth_provider().unwrap();
        assert_eq!(provider.name(), "key");
    }

    #[test]
    fn test_iap_provider_requires_audience() {
        let vars = with(base_vars(), &[("AUTH_PROVIDER", "iap")]);
        assert_eq!(auth_error(&vars), "auth-audience must be set");
    }

    #[test]
    fn test_iap_provider_selected() {
        let vars = with(
            base_vars(),
            &[("AUTH_PROVIDER", "IAP"), ("AUTH_AUDIENCE", "/projects/1/apps/x")],
        );
        let provider = Config::from_vars(&vars).unwrap().auth_provider().unwrap();
        assert_eq!(provider.name(), "iap");
    }

    #[test]
    fn test_jwt_provider_requires_jwks_url() {
        let vars = with(
            base_vars(),
            &[("AUTH_PROVIDER", "jwt"), ("AUTH_REQUIRED_CLAIMS", "iss=a")],
        );
        assert_eq!(auth_error(&vars), "auth-jwks-url must be set");
    }

    #[test]
    fn test_jwt_provider_requires_claims() {
        let vars = with(
            base_vars(),
            &[("AUTH_PROVIDER", "jwt"), ("AUTH_JWKS_URL", "http://jwks")],
        );
        assert_eq!(auth_error(&vars), "auth-required-claims must be set");
    }

    #[test]
    fn test_jwt_provider_malformed_claims() {
        let vars = with(
            base_vars(),
            &[
                ("AUTH_PROVIDER", "jwt"),
                ("AUTH_JWKS_URL", "http://jwks"),
                ("AUTH_REQUIRED_CLAIMS", "iss=a,broken"),
            ],
        );
        let message = auth_error(&vars);
        assert!(
            message.starts_with("auth-required-claims invalid format: "),
            "unexpected message: {message}"
        );
        assert!(message.contains("broken"));
    }

    #[test]
    fn test_jwt_provider_defaults_header() {
        let vars = with(
            base_vars(),
            &[
                ("AUTH_PROVIDER", "Jwt"),
                ("AUTH_JWKS_URL", "http://jwks"),
                ("AUTH_REQUIRED_CLAIMS", "iss=a, aud=b"),
            ],
        );
        let provider = Config::from_vars(&vars).unwrap().auth_provider().unwrap();
        assert_eq!(provider.name(), "jwt");
        assert!(format!("{provider:?}").contains("\"authorization\""));
    }

    #[test]
    fn test_noop_provider_selected() {
        let vars = with(base_vars(), &[("AUTH_PROVIDER", "No-Op")]);
        let provider = Config::from_vars(&vars).unwrap().auth_provider().unwrap();
        assert_eq!(provider.name(), "no-op");
    }

    #[test]
    fn test_unknown_provider() {
        let vars = with(base_vars(), &[("AUTH_PROVIDER", "Basic")]);
        assert_eq!(auth_error(&vars), "unknown auth-provider: basic");

        let vars = base_vars();
        assert_eq!(auth_error(&vars), "unknown auth-provider: ");
    }
}
