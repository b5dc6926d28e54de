//! device-telemetry-gateway server entry point.
//!
//! Starts the Axum HTTP server with the health and WebSocket endpoints.

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use device_telemetry_gateway::api;
use device_telemetry_gateway::app_state::AppState;
use device_telemetry_gateway::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        addr = %config.listen_addr,
        ws_path = %config.ws_path,
        devices = config.session.seed.len(),
        "starting device-telemetry-gateway"
    );

    let listen_addr = config.listen_addr;
    let shutdown = CancellationToken::new();
    let app = api::build_router(AppState::new(config, shutdown.clone()));

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Waits for Ctrl-C, then cancels every live session.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
