//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so every response is counted, including
//! 401s from the auth gate, 499/502 from the proxy and 500s from recovered
//! panics.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Records method, normalized endpoint, status and duration of every request.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn test_app() -> Router {
        Router::new()
            .route("/isalive", get(|| async { "ok\n" }))
            .fallback(|| async { StatusCode::BAD_GATEWAY })
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    #[tokio::test]
    async fn test_middleware_passes_response_through() {
        let request = HttpRequest::builder()
            .uri("/isalive")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app().oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_sees_fallback_responses() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/anything/else")
            .body(Body::empty())
            .expect("request builder should succeed");

        let response = test_app().oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
