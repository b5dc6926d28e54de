//! Outbound half of a telemetry session.
//!
//! On every tick [`TelemetryEmitter`] raises each device's temperature by
//! the ambient increment, writes the new values back to the store, and
//! sends the sorted samples to the client as one JSON array frame.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::time::MissedTickBehavior;

use super::shutdown::{CloseCause, ShutdownSignal};
use crate::config::SessionSettings;
use crate::domain::DeviceStore;
use crate::error::TelemetryError;

/// Counters reported when the emitter stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmitterStats {
    /// Snapshot frames successfully written.
    pub frames_emitted: u64,
}

/// Periodic snapshot producer.
#[derive(Debug)]
pub struct TelemetryEmitter {
    store: Arc<DeviceStore>,
    signal: ShutdownSignal,
    tick_interval: Duration,
    ambient_increment: f64,
    write_timeout: Duration,
}

impl TelemetryEmitter {
    /// Creates an emitter for `store` using the cadence in `settings`.
    #[must_use]
    pub fn new(store: Arc<DeviceStore>, signal: ShutdownSignal, settings: &SessionSettings) -> Self {
        Self {
            store,
            signal,
            tick_interval: settings.tick_interval,
            ambient_increment: settings.ambient_increment,
            write_timeout: settings.write_timeout,
        }
    }

    /// Performs one tick's store pass and returns the serialized frame.
    ///
    /// The increment is persisted, so drift compounds across ticks.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::NonFiniteTemperature`] if any temperature
    /// has overflowed to infinity or become NaN, since JSON has no encoding
    /// for it, and [`TelemetryError::Serialization`] if encoding fails.
    pub async fn tick(&self) -> Result<String, TelemetryError> {
        let increment = self.ambient_increment;
        let snapshot = self
            .store
            .update_each_sorted(|sample| sample.temperature += increment)
            .await;
        if let Some(bad) = snapshot.iter().find(|s| !s.temperature.is_finite()) {
            return Err(TelemetryError::NonFiniteTemperature {
                device_id: bad.device_id.clone(),
                temperature: bad.temperature,
            });
        }
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Emits one frame per tick until a write fails or the session is
    /// cancelled. The first tick fires immediately. Returns the sink so the
    /// supervisor can close it.
    pub async fn run<K>(self, mut sink: K) -> (K, EmitterStats)
    where
        K: Sink<Message> + Unpin,
        K::Error: Display,
    {
        let mut stats = EmitterStats::default();
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.signal.triggered() => break,
                _ = interval.tick() => {}
            }

            let frame = match self.tick().await {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!(code = err.error_code(), error = %err, "snapshot encoding failed");
                    self.signal
                        .trigger(CloseCause::SerializationFailed(err.to_string()));
                    break;
                }
            };

            let write = tokio::time::timeout(self.write_timeout, sink.send(Message::text(frame)));
            let outcome = tokio::select! {
                biased;
                () = self.signal.triggered() => break,
                outcome = write => outcome,
            };

            match outcome {
                Ok(Ok(())) => stats.frames_emitted += 1,
                Ok(Err(err)) => {
                    let err = TelemetryError::TransportWrite(err.to_string());
                    tracing::warn!(code = err.error_code(), error = %err, "ws write failed");
                    self.signal.trigger(CloseCause::WriteFailed(err.to_string()));
                    break;
                }
                Err(_) => {
                    let err = TelemetryError::TransportWrite(format!(
                        "timed out after {:?}",
                        self.write_timeout
                    ));
                    tracing::warn!(code = err.error_code(), error = %err, "ws write stalled");
                    self.signal.trigger(CloseCause::WriteFailed(err.to_string()));
                    break;
                }
            }
        }

        (sink, stats)
    }
}
