//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
///
/// Holds no device state; every session owns its own store.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// Server-wide shutdown token. Each session derives a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates application state from a loaded configuration.
    #[must_use]
    pub fn new(config: GatewayConfig, shutdown: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            shutdown,
        }
    }
}
