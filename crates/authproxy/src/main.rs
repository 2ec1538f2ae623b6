//! authproxy
//!
//! Authenticating reverse proxy: every request except the liveness probe
//! passes the configured auth gate before it is forwarded upstream.

use authproxy::config::Config;
use authproxy::observability::{init_tracing, metrics::init_metrics_recorder};
use authproxy::proxy::ReverseProxy;
use authproxy::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config.log_level)?;

    info!(
        bind_address = %config.bind_address,
        metrics_bind_address = %config.metrics_bind_address,
        upstream_scheme = %config.upstream_scheme,
        upstream_host = %config.upstream_host,
        auth_provider = %config.auth_provider,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Provider selection and initial key fetch must succeed before serving
    let provider = config.auth_provider().map_err(|e| {
        error!("Failed to select auth provider: {}", e);
        e
    })?;
    let auth_gate = provider.gate().await.map_err(|e| {
        error!(provider = provider.name(), "Failed to initialize auth provider: {}", e);
        e
    })?;
    info!(provider = provider.name(), "Auth provider initialized");

    let proxy = ReverseProxy::new(&config.upstream_scheme, &config.upstream_host).map_err(|e| {
        error!("Failed to build upstream client: {}", e);
        e
    })?;
    let proxy = Arc::new(proxy);
    let state = AppState { proxy, auth_gate };
    let app = routes::build_routes(state);
    let metrics_app = routes::build_metrics_routes(metrics_handle);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_bind_address).await?;

    let shutdown = CancellationToken::new();

    let metrics_shutdown = shutdown.clone();
    let metrics_bind_address = config.metrics_bind_address;
    let metrics_server = tokio::spawn(async move {
        info!("Metrics server listening on {}", metrics_bind_address);
        if let Err(e) = axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
            .await
        {
            error!("Metrics server error: {}", e);
        }
    });

    info!("authproxy listening on {}", config.bind_address);

    let main_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        main_shutdown.cancel();
    })
    .await?;

    shutdown.cancel();
    if let Err(e) = metrics_server.await {
        error!("Metrics server task failed: {}", e);
    }

    info!("authproxy shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
