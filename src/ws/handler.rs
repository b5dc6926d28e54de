//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use futures_util::StreamExt;

use super::session::TelemetrySession;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to a telemetry session.
///
/// Each upgrade gets its own [`TelemetrySession`] with a freshly seeded
/// store. The session is cancelled when the server shuts down.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let session = TelemetrySession::new(&state.config.session, &state.shutdown);
    let session_id = session.id();
    tracing::debug!(%session_id, "websocket upgrade requested");

    ws.on_failed_upgrade(move |err| {
        tracing::warn!(%session_id, error = %err, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        let (ws_tx, ws_rx) = socket.split();
        let report = session.run(ws_rx, ws_tx).await;
        tracing::debug!(
            session_id = %report.session_id,
            cause = ?report.cause,
            commands_applied = report.ingress.commands_applied,
            frames_emitted = report.emitter.frames_emitted,
            "websocket session finished"
        );
    })
}
