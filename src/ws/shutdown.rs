//! Broadcast-once termination signal shared by a session's tasks.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, DropGuard};

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// Client sent a Close frame or the inbound stream ended.
    ClientClosed,
    /// Reading from the connection failed.
    ReadFailed(String),
    /// Writing to the connection failed or timed out.
    WriteFailed(String),
    /// An outbound snapshot could not be serialized.
    SerializationFailed(String),
    /// The server is shutting down.
    ServerShutdown,
    /// An ingress or emitter task panicked.
    TaskFailed(String),
}

/// Termination signal for one session.
///
/// Cloned into each task. The first call to [`ShutdownSignal::trigger`]
/// records the cause and cancels the token; later calls are no-ops.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
    cause: Arc<OnceLock<CloseCause>>,
}

impl ShutdownSignal {
    /// Creates a signal whose token is cancelled when `parent` is.
    #[must_use]
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// Records `cause` and cancels the session.
    ///
    /// Returns `true` if this call was the first to trigger.
    pub fn trigger(&self, cause: CloseCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    /// Returns `true` once the session has been cancelled.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the session is cancelled.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Returns a guard that cancels the session when dropped unless it is
    /// disarmed first.
    #[must_use]
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Returns the recorded cause.
    ///
    /// A cancelled token with no recorded cause means the parent token
    /// fired, which is reported as [`CloseCause::ServerShutdown`].
    #[must_use]
    pub fn cause(&self) -> Option<CloseCause> {
        match self.cause.get() {
            Some(cause) => Some(cause.clone()),
            None if self.token.is_cancelled() => Some(CloseCause::ServerShutdown),
            None => None,
        }
    }
}
