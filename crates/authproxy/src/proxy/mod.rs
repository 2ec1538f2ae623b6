//! Reverse proxy to the single configured upstream.
//!
//! Each inbound request is forwarded exactly once. The scheme and authority
//! are rewritten to the upstream; method, body and the raw path and query
//! pass through byte-for-byte (no dot-segment removal, no re-encoding). The
//! upstream response (status, headers, body) is relayed as-is, minus
//! hop-by-hop headers. Redirects are relayed, never followed. Protocol
//! upgrades are not relayed: `Upgrade` is hop-by-hop and is stripped.

use crate::errors::ProxyError;
use crate::middleware::RequestContext;
use crate::observability::metrics::record_upstream_request;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, uri::PathAndQuery, HeaderMap, HeaderName, HeaderValue, Uri, Version},
    response::Response,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use secrecy::ExposeSecret;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Timeout for establishing the upstream connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Reverse proxy bound to one upstream.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    scheme: String,
    host: String,
    client: UpstreamClient,
}

impl ReverseProxy {
    /// Create a proxy for `scheme://host`. The scheme is lower-cased.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS client configuration cannot be built.
    pub fn new(scheme: &str, host: &str) -> Result<Self, rustls::Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(CONNECT_TIMEOUT));

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            client,
        })
    }

    pub fn upstream(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Point the inbound URI at the upstream, keeping its path and query as received.
    fn target_uri(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(self.host.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidRequest(format!("upstream uri: {e}")))
    }

    /// Forward one request and relay the upstream response.
    ///
    /// # Errors
    ///
    /// - `ProxyError::Canceled` when the request context is cancelled or the
    ///   inbound body fails mid-stream (client gone)
    /// - `ProxyError::Upstream` for any other forwarding failure
    /// - `ProxyError::InvalidRequest` when the outbound request cannot be built
    #[instrument(skip_all, name = "authproxy.proxy.forward", fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn forward(&self, req: Request) -> Result<Response, ProxyError> {
        let start = Instant::now();
        let result = self.send(req).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(ProxyError::Canceled) => "canceled",
            Err(_) => "error",
        };
        record_upstream_request(outcome, start.elapsed());

        result
    }

    async fn send(&self, req: Request) -> Result<Response, ProxyError> {
        let (mut parts, body) = req.into_parts();
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();

        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(header::HOST);

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut parts.headers, *addr)?;
        }

        if let Some(token) = ctx.access_token() {
            let value = HeaderValue::try_from(format!("Bearer {}", token.expose_secret()))
                .map_err(|e| ProxyError::InvalidRequest(format!("access token header: {e}")))?;
            parts.headers.insert(header::AUTHORIZATION, value);
        }

        parts.uri = self.target_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        let outbound = Request::from_parts(parts, body);

        let upstream = tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => return Err(ProxyError::Canceled),
            result = self.client.request(outbound) => result.map_err(classify)?,
        };

        let (mut response_parts, upstream_body) = upstream.into_parts();
        strip_hop_by_hop(&mut response_parts.headers);
        Ok(Response::from_parts(response_parts, Body::new(upstream_body)))
    }
}

/// Classify a client error: an inbound body failure means the client went away.
fn classify(err: hyper_util::client::legacy::Error) -> ProxyError {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if cause.is::<axum::Error>() {
            return ProxyError::Canceled;
        }
        source = cause.source();
    }
    ProxyError::Upstream(format!("{err:?}"))
}

/// Remove hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) -> Result<(), ProxyError> {
    let client_ip = addr.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
        _ => client_ip,
    };
    let value = HeaderValue::try_from(value)
        .map_err(|e| ProxyError::InvalidRequest(format!("x-forwarded-for header: {e}")))?;
    headers.insert(X_FORWARDED_FOR, value);
    Ok(())
}

/// Handler forwarding every request it receives.
pub async fn proxy_handler(
    State(proxy): State<Arc<ReverseProxy>>,
    req: Request,
) -> Result<Response, ProxyError> {
    proxy.forward(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_target_uri_rewrites_scheme_and_host() {
        let proxy = ReverseProxy::new("HTTP", "upstream.internal:8080").unwrap();
        let uri: Uri = "http://inbound.example/api/v1/items?page=2&q=a%20b"
            .parse()
            .unwrap();

        assert_eq!(
            proxy.target_uri(&uri).unwrap().to_string(),
            "http://upstream.internal:8080/api/v1/items?page=2&q=a%20b"
        );
        assert_eq!(proxy.upstream(), "http://upstream.internal:8080");
    }

    #[test]
    fn test_target_uri_without_path() {
        let proxy = ReverseProxy::new("https", "upstream").unwrap();
        let uri: Uri = "http://inbound.example".parse().unwrap();
        assert_eq!(proxy.target_uri(&uri).unwrap().to_string(), "https://upstream/");
    }

    #[test]
    fn test_target_uri_keeps_dot_segments_and_escapes() {
        let proxy = ReverseProxy::new("http", "upstream").unwrap();

        for raw in ["/a/../b", "/a/%2e%2e/secret", "/x%7By%7D?q=%2F..%2F", "/./c//d"] {
            let uri: Uri = raw.parse().unwrap();
            let target = proxy.target_uri(&uri).unwrap();
            assert_eq!(target.path_and_query().unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-custom-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-custom-hop", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("x-end-to-end", HeaderValue::from_static("kept"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-end-to-end").unwrap(), "kept");
    }

    #[test]
    fn test_append_forwarded_for() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 4000);

        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, addr).unwrap();
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.0.2.1"));
        append_forwarded_for(&mut headers, addr).unwrap();
        assert_eq!(
            headers.get("x-forwarded-for").unwrap(),
            "192.0.2.1, 10.0.0.7"
        );
    }
}
