//! Current telemetry reading for one device.

use serde::{Deserialize, Serialize};

use super::DeviceId;

/// Latest telemetry sample of a device.
///
/// Serialized in the outbound snapshot as
/// `{"deviceId": "...", "status": "...", "temperature": 36.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSample {
    /// Device identifier (immutable for the session).
    pub device_id: DeviceId,

    /// Free-form status label, e.g. `"在线"`.
    pub status: String,

    /// Temperature in degrees. No bounds are enforced.
    pub temperature: f64,
}

impl DeviceSample {
    /// Creates a new sample.
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>, status: impl Into<String>, temperature: f64) -> Self {
        Self {
            device_id: device_id.into(),
            status: status.into(),
            temperature,
        }
    }
}
