//! # device-telemetry-gateway
//!
//! WebSocket gateway that streams simulated device telemetry to a client
//! and accepts control commands that adjust device state.
//!
//! Every accepted connection becomes an isolated telemetry session with its
//! own device store. Two tasks run per session: one applies client commands,
//! the other emits a sorted snapshot of all devices once per tick.
//!
//! ## Architecture
//!
//! ```text
//! Client (WebSocket)
//!     │
//!     ├── Upgrade handler (ws/handler)
//!     │
//!     ├── TelemetrySession (ws/session)
//!     │     ├── CommandIngress   ──writes──▶ DeviceStore
//!     │     └── TelemetryEmitter ──reads/drifts──▶ DeviceStore
//!     │
//!     └── DeviceStore (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;
