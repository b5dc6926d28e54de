//! Gateway error types.
//!
//! [`TelemetryError`] is the central error type. Variants fall into two
//! classes: recoverable ones (a single frame or lookup is rejected and the
//! session carries on) and fatal ones (the session is torn down).

use crate::domain::DeviceId;

/// Server-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category        | Effect on the session |
/// |-----------|-----------------|-----------------------|
/// | 1000–1999 | Decode          | frame discarded       |
/// | 2000–2999 | Lookup          | no mutation           |
/// | 3000–3999 | Transport/Codec | session closed        |
/// | 5000–5999 | Configuration   | startup aborted       |
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Inbound frame is not a valid JSON envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Envelope `type` is not a known command.
    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    /// Payload of a known command is missing fields or has wrong types.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Command type whose payload failed to decode.
        kind: String,
        /// Decoder message.
        reason: String,
    },

    /// Command references a device that is not tracked by the session.
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// A device with the same identifier is already tracked.
    #[error("device already registered: {0}")]
    DeviceExists(DeviceId),

    /// Reading from the connection failed.
    #[error("transport read failed: {0}")]
    TransportRead(String),

    /// Writing to the connection failed or timed out.
    #[error("transport write failed: {0}")]
    TransportWrite(String),

    /// Outbound snapshot could not be serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A device's temperature is NaN or infinite and has no JSON number form.
    #[error("non-finite temperature {temperature} for device {device_id}")]
    NonFiniteTemperature {
        /// Offending device.
        device_id: DeviceId,
        /// The non-finite value.
        temperature: f64,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TelemetryError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedFrame(_) => 1001,
            Self::UnknownCommand(_) => 1002,
            Self::InvalidPayload { .. } => 1003,
            Self::DeviceNotFound(_) => 2001,
            Self::DeviceExists(_) => 2002,
            Self::TransportRead(_) => 3001,
            Self::TransportWrite(_) => 3002,
            Self::Serialization(_) => 3003,
            Self::NonFiniteTemperature { .. } => 3004,
            Self::Config(_) => 5001,
        }
    }

    /// Returns `true` if the session may continue after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_)
                | Self::UnknownCommand(_)
                | Self::InvalidPayload { .. }
                | Self::DeviceNotFound(_)
                | Self::DeviceExists(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_and_lookup_errors_are_recoverable() {
        assert!(TelemetryError::MalformedFrame("x".into()).is_recoverable());
        assert!(TelemetryError::UnknownCommand("x".into()).is_recoverable());
        assert!(TelemetryError::DeviceNotFound(DeviceId::from("x")).is_recoverable());
    }

    #[test]
    fn transport_errors_are_fatal() {
        assert!(!TelemetryError::TransportRead("reset".into()).is_recoverable());
        assert!(!TelemetryError::TransportWrite("closed".into()).is_recoverable());
        assert!(
            !TelemetryError::NonFiniteTemperature {
                device_id: DeviceId::from("x"),
                temperature: f64::NEG_INFINITY,
            }
            .is_recoverable()
        );
    }

    #[test]
    fn codes_fall_in_category_ranges() {
        assert_eq!(TelemetryError::UnknownCommand("x".into()).error_code(), 1002);
        assert_eq!(
            TelemetryError::DeviceNotFound(DeviceId::from("x")).error_code(),
            2001
        );
        assert_eq!(TelemetryError::Config("x".into()).error_code(), 5001);
    }
}
