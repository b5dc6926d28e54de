//! WebSocket message types: inbound envelope and commands.
//!
//! Inbound frames are JSON envelopes `{"type": "...", "data": {...}}`. The
//! envelope is decoded first and `data` is interpreted according to `type`,
//! so an unknown type and a bad payload for a known type are reported as
//! different errors.

use serde::Deserialize;

use crate::domain::DeviceId;
use crate::error::TelemetryError;

/// Command type string for [`InboundCommand::DecreaseTemperature`].
pub const DECREASE_TEMPERATURE: &str = "decrease_temperature";

/// Top-level inbound envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Command discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Command-specific payload, decoded lazily.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Payload of a `decrease_temperature` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecreaseTemperature {
    /// Target device.
    pub device_id: DeviceId,
    /// Degrees to subtract from the current temperature.
    pub amount: f64,
}

/// Commands a client can send over the telemetry socket.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    /// Lower a device's temperature by a fixed amount.
    DecreaseTemperature(DecreaseTemperature),
}

impl InboundCommand {
    /// Decodes a text frame into a command.
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::MalformedFrame`] if the text is not an envelope.
    /// - [`TelemetryError::UnknownCommand`] if `type` is not recognised.
    /// - [`TelemetryError::InvalidPayload`] if `data` does not match `type`.
    pub fn decode(text: &str) -> Result<Self, TelemetryError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| TelemetryError::MalformedFrame(e.to_string()))?;

        match envelope.kind.as_str() {
            DECREASE_TEMPERATURE => {
                let data: DecreaseTemperature = serde_json::from_value(envelope.data)
                    .map_err(|e| TelemetryError::InvalidPayload {
                        kind: envelope.kind.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Self::DecreaseTemperature(data))
            }
            _ => Err(TelemetryError::UnknownCommand(envelope.kind)),
        }
    }

    /// Returns the wire `type` string of this command.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DecreaseTemperature(_) => DECREASE_TEMPERATURE,
        }
    }
}
