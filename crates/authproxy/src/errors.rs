//! authproxy error types.
//!
//! Per-request failures map to HTTP responses via `IntoResponse`. Bodies
//! returned to clients are intentionally generic; the actual cause is only
//! logged server-side (authentication causes at debug level).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Status code used when the client goes away before the upstream answered.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

const WWW_AUTHENTICATE_MISSING: &str = "Bearer realm=\"authproxy\"";
const WWW_AUTHENTICATE_INVALID: &str = "Bearer realm=\"authproxy\", error=\"invalid_token\"";

/// Why a request was denied by an authentication gate.
///
/// Every variant renders as the same kind of 401 response. The variant only
/// shows up in debug logs and, through [`AuthRejection::reason`], in the
/// bounded `reason` label of the auth decision metric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("no credential presented")]
    MissingToken,

    #[error("credential does not match the pre-shared key")]
    InvalidSecret,

    #[error("token exceeds the maximum allowed size")]
    TokenTooLarge,

    #[error("token could not be parsed")]
    Malformed,

    #[error("no key in the key set matches the token")]
    UnknownKey,

    #[error("token algorithm does not match the key")]
    KeyMismatch,

    #[error("token signature is invalid")]
    SignatureMismatch,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token was issued in the future")]
    IssuedInFuture,

    #[error("token issuer is not accepted")]
    InvalidIssuer,

    #[error("token audience is not accepted")]
    InvalidAudience,

    #[error("required claim '{0}' does not match")]
    ClaimMismatch(String),
}

impl AuthRejection {
    /// Bounded label describing the rejection, for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthRejection::MissingToken => "missing_token",
            AuthRejection::InvalidSecret => "invalid_secret",
            AuthRejection::TokenTooLarge => "token_too_large",
            AuthRejection::Malformed => "malformed",
            AuthRejection::UnknownKey => "unknown_key",
            AuthRejection::KeyMismatch => "key_mismatch",
            AuthRejection::SignatureMismatch => "bad_signature",
            AuthRejection::Expired => "expired",
            AuthRejection::NotYetValid => "not_yet_valid",
            AuthRejection::IssuedInFuture => "issued_in_future",
            AuthRejection::InvalidIssuer => "invalid_issuer",
            AuthRejection::InvalidAudience => "invalid_audience",
            AuthRejection::ClaimMismatch(_) => "claim_mismatch",
        }
    }
}

impl From<common::jwt::JwtValidationError> for AuthRejection {
    fn from(err: common::jwt::JwtValidationError) -> Self {
        match err {
            common::jwt::JwtValidationError::TokenTooLarge => AuthRejection::TokenTooLarge,
            common::jwt::JwtValidationError::IatTooFarInFuture => AuthRejection::IssuedInFuture,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (body, challenge) = match self {
            AuthRejection::MissingToken => ("missing token\n", WWW_AUTHENTICATE_MISSING),
            _ => ("invalid token\n", WWW_AUTHENTICATE_INVALID),
        };

        let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(challenge),
        );
        response
    }
}

/// Failure while forwarding a request to the upstream.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The client disconnected or the request was cancelled.
    #[error("request canceled")]
    Canceled,

    /// The upstream could not be reached or answered with a protocol error.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The inbound request could not be turned into an outbound one.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::Canceled => STATUS_CLIENT_CLOSED_REQUEST,
            ProxyError::Upstream(_) => 502,
            ProxyError::InvalidRequest(_) => 500,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::Canceled => {
                tracing::debug!(target: "authproxy.proxy", "Request canceled by client");
            }
            ProxyError::Upstream(cause) => {
                tracing::warn!(target: "authproxy.proxy", error = %cause, "reverseproxy: proxy error");
            }
            ProxyError::InvalidRequest(cause) => {
                tracing::error!(target: "authproxy.proxy", error = %cause, "Failed to build outbound request");
            }
        }

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        status.into_response()
    }
}
