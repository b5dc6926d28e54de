//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::DeviceSample;
use crate::error::TelemetryError;

/// Status label given to the built-in seed devices.
const DEFAULT_STATUS: &str = "在线";

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8090`).
    pub listen_addr: SocketAddr,

    /// Route serving the WebSocket upgrade.
    pub ws_path: String,

    /// Emit JSON log lines instead of the default text format.
    pub log_json: bool,

    /// Per-connection session settings.
    pub session: SessionSettings,
}

/// Settings applied to every telemetry session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Period between snapshot frames.
    pub tick_interval: Duration,

    /// Degrees added to every device on every tick.
    pub ambient_increment: f64,

    /// Maximum time a single frame write may take before the session is
    /// considered dead.
    pub write_timeout: Duration,

    /// Devices installed into each new session's store. Never empty.
    pub seed: Vec<DeviceSample>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            ambient_increment: 1.0,
            write_timeout: Duration::from_millis(5000),
            seed: default_seed(),
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Config`] if `LISTEN_ADDR` cannot be parsed,
    /// `TELEMETRY_TICK_INTERVAL_MS` is zero, `TELEMETRY_AMBIENT_INCREMENT`
    /// is not finite, or `TELEMETRY_SEED_DEVICES` is
    /// malformed or empty.
    pub fn from_env() -> Result<Self, TelemetryError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8090".to_string())
            .parse()
            .map_err(|e| TelemetryError::Config(format!("LISTEN_ADDR: {e}")))?;

        let ws_path = std::env::var("WS_PATH").unwrap_or_else(|_| "/ws".to_string());
        if !ws_path.starts_with('/') {
            return Err(TelemetryError::Config(format!(
                "WS_PATH must start with '/': {ws_path}"
            )));
        }

        let log_json = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let tick_ms: u64 = parse_env("TELEMETRY_TICK_INTERVAL_MS", 1000);
        if tick_ms == 0 {
            return Err(TelemetryError::Config(
                "TELEMETRY_TICK_INTERVAL_MS must be positive".to_string(),
            ));
        }
        let ambient_increment = parse_env("TELEMETRY_AMBIENT_INCREMENT", 1.0_f64);
        validate_increment(ambient_increment)?;
        let write_timeout_ms: u64 = parse_env("TELEMETRY_WRITE_TIMEOUT_MS", 5000);

        let seed = match std::env::var("TELEMETRY_SEED_DEVICES") {
            Ok(raw) => parse_seed(&raw)?,
            Err(_) => default_seed(),
        };

        Ok(Self {
            listen_addr,
            ws_path,
            log_json,
            session: SessionSettings {
                tick_interval: Duration::from_millis(tick_ms),
                ambient_increment,
                write_timeout: Duration::from_millis(write_timeout_ms.max(1)),
                seed,
            },
        })
    }
}

/// Rejects NaN and infinite increments, which would make every emitted
/// temperature unencodable.
///
/// # Errors
///
/// Returns [`TelemetryError::Config`] if `increment` is not finite.
pub fn validate_increment(increment: f64) -> Result<(), TelemetryError> {
    if increment.is_finite() {
        Ok(())
    } else {
        Err(TelemetryError::Config(format!(
            "TELEMETRY_AMBIENT_INCREMENT must be finite, got {increment}"
        )))
    }
}

/// Built-in seed used when `TELEMETRY_SEED_DEVICES` is unset.
#[must_use]
pub fn default_seed() -> Vec<DeviceSample> {
    vec![
        DeviceSample::new("笔记本", DEFAULT_STATUS, 35.0),
        DeviceSample::new("手机", DEFAULT_STATUS, 36.0),
        DeviceSample::new("耳机", DEFAULT_STATUS, 37.0),
    ]
}

/// Parses a seed list of `id:status:temperature` entries separated by `;`.
///
/// Blank entries are skipped. Identifiers may not repeat.
///
/// # Errors
///
/// Returns [`TelemetryError::Config`] on a malformed entry, a duplicate
/// identifier, or when no entries remain.
pub fn parse_seed(raw: &str) -> Result<Vec<DeviceSample>, TelemetryError> {
    let mut seed: Vec<DeviceSample> = Vec::new();

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.splitn(3, ':').map(str::trim);
        let (Some(id), Some(status), Some(temperature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TelemetryError::Config(format!(
                "seed entry `{entry}` is not id:status:temperature"
            )));
        };
        if id.is_empty() {
            return Err(TelemetryError::Config(format!(
                "seed entry `{entry}` has an empty id"
            )));
        }
        let temperature: f64 = temperature.parse().map_err(|e| {
            TelemetryError::Config(format!("seed entry `{entry}` temperature: {e}"))
        })?;
        if !temperature.is_finite() {
            return Err(TelemetryError::Config(format!(
                "seed entry `{entry}` temperature must be finite"
            )));
        }
        if seed.iter().any(|s| s.device_id.as_str() == id) {
            return Err(TelemetryError::Config(format!("duplicate seed device `{id}`")));
        }
        seed.push(DeviceSample::new(id, status, temperature));
    }

    if seed.is_empty() {
        return Err(TelemetryError::Config(
            "TELEMETRY_SEED_DEVICES contains no devices".to_string(),
        ));
    }
    Ok(seed)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
