//! Test server harness for E2E testing
//!
//! Provides `TestAuthProxy` for spawning real authproxy instances in tests.

use authproxy::auth::AuthGate;
use authproxy::config::Config;
use authproxy::proxy::ReverseProxy;
use authproxy::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the proxy in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_isalive() -> anyhow::Result<()> {
///     let upstream = MockServer::start().await;
///     let proxy = TestAuthProxy::spawn(TestAuthProxy::vars(&upstream, &[("AUTH_PROVIDER", "no-op")])).await?;
///
///     let response = reqwest::get(format!("{}/isalive", proxy.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAuthProxy {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl TestAuthProxy {
    /// Configuration variables pointing the proxy at `upstream` over plain HTTP.
    pub fn vars(upstream: &wiremock::MockServer, extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars = HashMap::from([
            ("UPSTREAM_SCHEME".to_string(), "http".to_string()),
            ("UPSTREAM_HOST".to_string(), upstream.address().to_string()),
        ]);
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        vars
    }

    /// Spawn a proxy built from configuration variables, selecting the
    /// provider and running its gate initialization exactly as startup does.
    pub async fn spawn(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let provider = config
            .auth_provider()
            .map_err(|e| anyhow::anyhow!("Failed to select auth provider: {}", e))?;
        let auth_gate = provider
            .gate()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize auth provider: {}", e))?;

        Self::spawn_with_gate(&config.upstream_scheme, &config.upstream_host, auth_gate).await
    }

    /// Spawn a proxy to `scheme://host` behind an already built gate.
    pub async fn spawn_with_gate(
        scheme: &str,
        host: &str,
        auth_gate: AuthGate,
    ) -> Result<Self, anyhow::Error> {
        let proxy = ReverseProxy::new(scheme, host)
            .map_err(|e| anyhow::anyhow!("Failed to build upstream client: {}", e))?;
        let state = AppState {
            proxy: Arc::new(proxy),
            auth_gate,
        };
        let app = routes::build_routes(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestAuthProxy {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
