// ============================================================================
// Video Gateway Service
// ============================================================================
//
// Single entry point for clients of the video platform. It handles:
// - Bearer token verification (delegated to the auth service)
// - Request forwarding to the auth and video services
// - Multipart upload relaying and streamed downloads
// - Prometheus metrics for every request
//
// Stateless: can scale horizontally behind a load balancer.
//
// ============================================================================

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use video_gateway::config::{Config, LogFormat, LoggingConfig};
use video_gateway::context::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.logging)?;

    info!("=== Video Gateway Starting ===");
    info!("Port: {}", config.port);
    info!("Auth service: {}", config.services.auth_service_url);
    info!("Video service: {}", config.services.video_service_url);
    info!("Backend timeout: {}s", config.services.timeout_secs);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .context("Failed to parse bind address")?;

    let app_context = Arc::new(AppContext::new(config)?);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Video gateway listening on {}", addr);

    video_gateway::serve(listener, app_context, shutdown_signal())
        .await
        .context("Failed to start server")?;

    info!("Video gateway stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.rust_log)
        .with_context(|| format!("Invalid RUST_LOG directive: {}", logging.rust_log))?;

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
