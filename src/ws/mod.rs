//! WebSocket layer: upgrade handling and the per-connection telemetry
//! session.
//!
//! A session pairs a [`ingress::CommandIngress`] reading client commands
//! with a [`emitter::TelemetryEmitter`] streaming snapshots, both supervised
//! by [`session::TelemetrySession`].

pub mod emitter;
pub mod handler;
pub mod ingress;
pub mod messages;
pub mod session;
pub mod shutdown;

pub use session::{SessionReport, SessionState, TelemetrySession};
pub use shutdown::CloseCause;
