//! Inbound half of a telemetry session.
//!
//! [`CommandIngress`] consumes frames from the client, decodes them into
//! [`InboundCommand`]s and applies them to the session's [`DeviceStore`].
//! Bad frames are logged and dropped; transport failures end the session.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};

use super::messages::InboundCommand;
use super::shutdown::{CloseCause, ShutdownSignal};
use crate::domain::{DeviceSample, DeviceStore};
use crate::error::TelemetryError;

/// Counters reported when the ingress path stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngressStats {
    /// Text frames received.
    pub frames_received: u64,
    /// Commands that mutated the store.
    pub commands_applied: u64,
    /// Frames discarded because of decode or lookup errors.
    pub frames_rejected: u64,
}

/// Reader loop that turns client frames into store mutations.
#[derive(Debug)]
pub struct CommandIngress {
    store: Arc<DeviceStore>,
    signal: ShutdownSignal,
}

impl CommandIngress {
    /// Creates an ingress bound to `store` and the session's `signal`.
    #[must_use]
    pub fn new(store: Arc<DeviceStore>, signal: ShutdownSignal) -> Self {
        Self { store, signal }
    }

    /// Decodes a text frame and applies the resulting command.
    ///
    /// # Errors
    ///
    /// Returns a recoverable [`TelemetryError`] if the frame cannot be
    /// decoded or references an unknown device.
    pub async fn handle_text(&self, text: &str) -> Result<DeviceSample, TelemetryError> {
        let command = InboundCommand::decode(text)?;
        self.apply(command).await
    }

    /// Applies a decoded command to the store.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::DeviceNotFound`] if the target device is
    /// not tracked; the store is not modified.
    pub async fn apply(&self, command: InboundCommand) -> Result<DeviceSample, TelemetryError> {
        match command {
            InboundCommand::DecreaseTemperature(data) => {
                tracing::info!(
                    device_id = %data.device_id,
                    amount = data.amount,
                    "decrease_temperature received"
                );
                self.store
                    .upsert_delta(&data.device_id, |sample| sample.temperature -= data.amount)
                    .await
            }
        }
    }

    /// Runs until the stream fails, the client closes, or the session is
    /// cancelled. Returns the stream so the caller controls its release.
    pub async fn run<S, E>(self, mut stream: S) -> (S, IngressStats)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let mut stats = IngressStats::default();

        loop {
            let next = tokio::select! {
                biased;
                () = self.signal.triggered() => break,
                next = stream.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    let err = TelemetryError::TransportRead(err.to_string());
                    tracing::warn!(code = err.error_code(), error = %err, "ws read failed");
                    self.signal.trigger(CloseCause::ReadFailed(err.to_string()));
                    break;
                }
                None => {
                    tracing::debug!("ws inbound stream ended");
                    self.signal.trigger(CloseCause::ClientClosed);
                    break;
                }
            };

            if self.signal.is_triggered() {
                break;
            }

            match message {
                Message::Text(text) => {
                    stats.frames_received += 1;
                    match self.handle_text(text.as_str()).await {
                        Ok(sample) => {
                            stats.commands_applied += 1;
                            tracing::debug!(
                                device_id = %sample.device_id,
                                temperature = sample.temperature,
                                "command applied"
                            );
                        }
                        Err(err) => {
                            stats.frames_rejected += 1;
                            if err.is_recoverable() {
                                tracing::warn!(code = err.error_code(), error = %err, "inbound frame rejected");
                            } else {
                                tracing::error!(code = err.error_code(), error = %err, "inbound frame rejected");
                            }
                        }
                    }
                }
                Message::Binary(bytes) => {
                    stats.frames_rejected += 1;
                    tracing::warn!(len = bytes.len(), "binary frames are not supported");
                }
                Message::Close(frame) => {
                    tracing::info!(?frame, "client sent close");
                    self.signal.trigger(CloseCause::ClientClosed);
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }

        (stream, stats)
    }
}
