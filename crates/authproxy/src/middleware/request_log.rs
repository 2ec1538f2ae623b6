//! Request logging middleware.
//!
//! Emits one event for the request line and one for the response. Both are
//! recorded inside a span carrying a correlation id, taken from
//! `x-request-id` when the client sent one and generated otherwise.

use axum::{
    body::HttpBody,
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;

/// Correlation id header.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Log the request line and the response status, size and latency.
///
/// Responses with status >= 400 are logged at info, everything else at debug.
pub async fn request_log(mut req: Request, next: Next) -> Response {
    let correlation_id = correlation_id(&req);
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id,
        request_method = %req.method(),
        request_path = %req.uri().path(),
    );

    async move {
        let host = header_str(&req, header::HOST);
        let user_agent = header_str(&req, header::USER_AGENT);
        tracing::info!(
            target: "authproxy.request",
            request_host = %host,
            request_user_agent = %user_agent,
            request_protocol = ?req.version(),
            "{} - {}",
            req.method(),
            req.uri().path()
        );

        let start = Instant::now();
        let response = next.run(req).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = response.status();
        let bytes = response.body().size_hint().exact();
        let label = status_label(status.as_u16());

        if status.as_u16() >= 400 {
            tracing::info!(
                target: "authproxy.request",
                response_status = status.as_u16(),
                response_bytes = ?bytes,
                response_elapsed_ms = elapsed_ms,
                "response: HTTP {} ({})",
                status.as_u16(),
                label
            );
        } else {
            tracing::debug!(
                target: "authproxy.request",
                response_status = status.as_u16(),
                response_bytes = ?bytes,
                response_elapsed_ms = elapsed_ms,
                "response: HTTP {} ({})",
                status.as_u16(),
                label
            );
        }

        response
    }
    .instrument(span)
    .await
}

fn correlation_id(req: &Request) -> String {
    req.headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string)
}

fn header_str(req: &Request, name: HeaderName) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn status_label(status: u16) -> &'static str {
    match status {
        100..=299 => "OK",
        300..=399 => "Redirect",
        400..=499 => "Client Error",
        500.. => "Server Error",
        _ => "Unknown",
    }
}
