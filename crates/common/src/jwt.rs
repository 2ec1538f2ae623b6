//! Bearer-token and JWT helpers shared by the authentication providers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{bearer_token, check_token_size, validate_iat, JWT_CLOCK_SKEW};
//!
//! let token = bearer_token(header_value);
//! check_token_size(token)?;
//! // ... verify signature ...
//! validate_iat(iat, JWT_CLOCK_SKEW)?;
//! ```

use std::time::Duration;
use thiserror::Error;

/// Upper bound on a presented token, in bytes.
///
/// Checked before the token header is decoded. Large enough for tokens that
/// carry long group lists.
pub const MAX_JWT_SIZE_BYTES: usize = 64 * 1024;

/// Literal prefix stripped from credential header values.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Clock skew tolerance for generic JWKS-JWT tokens.
///
/// Applied symmetrically to `exp` and `nbf`, and to the `iat` future check.
pub const JWT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Maximum amount an Identity-Aware-Proxy token's `iat` may lie in the future.
pub const IAP_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Token checks that run outside signature verification.
///
/// Both variants display the same text; callers log the variant at debug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Longer than [`MAX_JWT_SIZE_BYTES`].
    #[error("invalid token")]
    TokenTooLarge,

    /// `iat` beyond the allowed skew.
    #[error("invalid token")]
    IatTooFarInFuture,
}

/// Extract the credential from a header value.
///
/// A leading literal `Bearer ` (case as written) is stripped, then surrounding
/// whitespace is trimmed. Values without the prefix are returned trimmed.
///
/// ```
/// use common::jwt::bearer_token;
///
/// assert_eq!(bearer_token("Bearer abc"), "abc");
/// assert_eq!(bearer_token("  abc  "), "abc");
/// assert_eq!(bearer_token("bearer abc"), "bearer abc");
/// ```
#[must_use]
pub fn bearer_token(header_value: &str) -> &str {
    header_value
        .strip_prefix(BEARER_PREFIX)
        .unwrap_or(header_value)
        .trim()
}

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` if the token exceeds the limit.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            len = token.len(),
            "Token longer than {} bytes",
            MAX_JWT_SIZE_BYTES
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Reject an `iat` more than `clock_skew` ahead of the local clock.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture`.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// [`validate_iat`] against a fixed `now`.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let max_iat = now.saturating_add(skew);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat,
            max_iat,
            "iat lies beyond the allowed skew"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
