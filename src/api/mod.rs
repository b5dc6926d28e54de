//! HTTP surface: router composition and system endpoints.

pub mod system;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router: system routes plus the WebSocket endpoint
/// at the configured path.
pub fn build_router(state: AppState) -> Router {
    let ws_path = state.config.ws_path.clone();
    Router::new()
        .merge(system::routes())
        .route(&ws_path, get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
