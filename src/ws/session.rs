//! WebSocket session state machine.
//!
//! [`TelemetrySession`] owns one connection. It runs [`CommandIngress`] and
//! [`TelemetryEmitter`] as separate tasks over the two halves of the socket,
//! waits for the first termination signal, joins both tasks and closes the
//! outbound half exactly once.
//!
//! ```text
//! Connecting ──run()──▶ Active ──first signal──▶ Closing ──tasks joined, sink closed──▶ Closed
//! ```

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::emitter::{EmitterStats, TelemetryEmitter};
use super::ingress::{CommandIngress, IngressStats};
use super::shutdown::{CloseCause, ShutdownSignal};
use crate::config::SessionSettings;
use crate::domain::{DeviceStore, SessionId};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade requested, socket not yet handed over.
    Connecting,
    /// Ingress and emitter are running.
    Active,
    /// A termination signal fired; tasks are stopping.
    Closing,
    /// Both tasks stopped and the connection was released.
    Closed,
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: SessionId,
    /// First termination cause observed.
    pub cause: CloseCause,
    /// Ingress counters.
    pub ingress: IngressStats,
    /// Emitter counters.
    pub emitter: EmitterStats,
}

/// Supervisor for one telemetry connection.
#[derive(Debug)]
pub struct TelemetrySession {
    id: SessionId,
    settings: SessionSettings,
    store: Arc<DeviceStore>,
    signal: ShutdownSignal,
    state: watch::Sender<SessionState>,
}

impl TelemetrySession {
    /// Creates a session in the [`SessionState::Connecting`] state with its
    /// own store seeded from `settings`.
    ///
    /// Cancelling `shutdown` terminates the session.
    #[must_use]
    pub fn new(settings: &SessionSettings, shutdown: &CancellationToken) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: SessionId::new(),
            settings: settings.clone(),
            store: Arc::new(DeviceStore::from_seed(settings.seed.iter().cloned())),
            signal: ShutdownSignal::child_of(shutdown),
            state,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns a receiver tracking the session state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Returns the session's device store.
    #[must_use]
    pub fn store(&self) -> Arc<DeviceStore> {
        Arc::clone(&self.store)
    }

    /// Runs the session over an upgraded connection until it terminates.
    ///
    /// `stream` and `sink` are the inbound and outbound halves of the
    /// socket. The sink is closed exactly once before returning.
    pub async fn run<S, E, K>(self, stream: S, sink: K) -> SessionReport
    where
        S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: Display + Send,
    {
        let span = tracing::info_span!("session", session_id = %self.id);
        self.supervise(stream, sink).instrument(span).await
    }

    async fn supervise<S, E, K>(self, stream: S, sink: K) -> SessionReport
    where
        S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: Display + Send,
    {
        self.state.send_replace(SessionState::Active);
        let devices = self.store.len().await;
        tracing::info!(
            devices,
            tick_ms = u64::try_from(self.settings.tick_interval.as_millis()).unwrap_or(u64::MAX),
            "telemetry session active"
        );

        let ingress = CommandIngress::new(Arc::clone(&self.store), self.signal.clone());
        let emitter = TelemetryEmitter::new(
            Arc::clone(&self.store),
            self.signal.clone(),
            &self.settings,
        );
        let ingress_task = tokio::spawn(
            guarded(self.signal.clone(), ingress.run(stream)).in_current_span(),
        );
        let emitter_task = tokio::spawn(
            guarded(self.signal.clone(), emitter.run(sink)).in_current_span(),
        );

        self.signal.triggered().await;
        self.state.send_replace(SessionState::Closing);
        tracing::debug!("session closing; waiting for tasks");

        let ingress_stats = match ingress_task.await {
            Ok((stream, stats)) => {
                drop(stream);
                stats
            }
            Err(err) => {
                tracing::error!(error = %err, "ingress task failed");
                self.signal.trigger(CloseCause::TaskFailed(err.to_string()));
                IngressStats::default()
            }
        };

        let emitter_stats = match emitter_task.await {
            Ok((mut sink, stats)) => {
                if let Err(err) = sink.close().await {
                    tracing::debug!(error = %err, "ws close failed");
                }
                stats
            }
            Err(err) => {
                tracing::error!(error = %err, "emitter task failed");
                self.signal.trigger(CloseCause::TaskFailed(err.to_string()));
                EmitterStats::default()
            }
        };

        let cause = self.signal.cause().unwrap_or(CloseCause::ServerShutdown);
        self.state.send_replace(SessionState::Closed);
        tracing::info!(
            ?cause,
            commands_applied = ingress_stats.commands_applied,
            frames_rejected = ingress_stats.frames_rejected,
            frames_emitted = emitter_stats.frames_emitted,
            "telemetry session closed"
        );

        SessionReport {
            session_id: self.id,
            cause,
            ingress: ingress_stats,
            emitter: emitter_stats,
        }
    }
}

/// Runs `fut` while holding a guard that cancels the session if the task
/// unwinds before finishing.
async fn guarded<F: std::future::Future>(signal: ShutdownSignal, fut: F) -> F::Output {
    let guard = signal.cancel_on_drop();
    let output = fut.await;
    let _ = guard.disarm();
    output
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::domain::{DeviceId, DeviceSample};

    /// Inbound half backed by a channel the test writes into.
    struct TestStream(mpsc::UnboundedReceiver<Result<Message, String>>);

    impl Stream for TestStream {
        type Item = Result<Message, String>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.0.poll_recv(cx)
        }
    }

    /// Outbound half forwarding text frames to the test and counting closes.
    /// While `stalled` is set, `poll_ready` never completes.
    struct TestSink {
        tx: mpsc::UnboundedSender<String>,
        closes: Arc<AtomicUsize>,
        stalled: Arc<AtomicBool>,
    }

    impl Sink<Message> for TestSink {
        type Error = String;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), String>> {
            if self.stalled.load(Ordering::SeqCst) {
                return Poll::Pending;
            }
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), String> {
            let Message::Text(text) = item else {
                return Err("unexpected non-text frame".to_string());
            };
            self.tx
                .send(text.as_str().to_string())
                .map_err(|_| "peer gone".to_string())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), String>> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    struct Harness {
        inbound: mpsc::UnboundedSender<Result<Message, String>>,
        outbound: mpsc::UnboundedReceiver<String>,
        closes: Arc<AtomicUsize>,
        stalled: Arc<AtomicBool>,
        state: watch::Receiver<SessionState>,
        store: Arc<DeviceStore>,
        task: tokio::task::JoinHandle<SessionReport>,
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            tick_interval: Duration::from_secs(1),
            ambient_increment: 1.0,
            write_timeout: Duration::from_secs(5),
            seed: vec![
                DeviceSample::new("B", "在线", 36.0),
                DeviceSample::new("A", "在线", 35.0),
            ],
        }
    }

    fn start(shutdown: &CancellationToken) -> Harness {
        let session = TelemetrySession::new(&settings(), shutdown);
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));
        let stalled = Arc::new(AtomicBool::new(false));
        let sink = TestSink {
            tx: outbound_tx,
            closes: Arc::clone(&closes),
            stalled: Arc::clone(&stalled),
        };
        let state = session.state();
        let store = session.store();
        assert_eq!(*state.borrow(), SessionState::Connecting);
        let task = tokio::spawn(session.run(TestStream(inbound_rx), sink));
        Harness {
            inbound,
            outbound,
            closes,
            stalled,
            state,
            store,
            task,
        }
    }

    async fn next_snapshot(h: &mut Harness) -> Vec<DeviceSample> {
        let Some(frame) = h.outbound.recv().await else {
            panic!("outbound closed early");
        };
        let Ok(samples) = serde_json::from_str(&frame) else {
            panic!("frame is not a sample array: {frame}");
        };
        samples
    }

    fn temperature_of(samples: &[DeviceSample], id: &str) -> f64 {
        let Some(sample) = samples.iter().find(|s| s.device_id.as_str() == id) else {
            panic!("{id} missing from snapshot");
        };
        sample.temperature
    }

    fn text(s: &str) -> Result<Message, String> {
        Ok(Message::text(s.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_emits_sorted_incremented_snapshot() {
        let mut h = start(&CancellationToken::new());
        let snapshot = next_snapshot(&mut h).await;
        assert_eq!(
            snapshot,
            vec![
                DeviceSample::new("A", "在线", 36.0),
                DeviceSample::new("B", "在线", 37.0),
            ]
        );
        assert_eq!(*h.state.borrow(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn command_between_ticks_is_reflected_in_next_frame() {
        let mut h = start(&CancellationToken::new());
        let first = next_snapshot(&mut h).await;
        assert_eq!(temperature_of(&first, "A"), 36.0);

        assert!(
            h.inbound
                .send(text(
                    r#"{"type":"decrease_temperature","data":{"deviceId":"A","amount":5.0}}"#
                ))
                .is_ok()
        );

        let second = next_snapshot(&mut h).await;
        assert_eq!(temperature_of(&second, "A"), 32.0);
        assert_eq!(temperature_of(&second, "B"), 38.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_type_and_unknown_device_keep_session_active() {
        let mut h = start(&CancellationToken::new());
        let _ = next_snapshot(&mut h).await;

        assert!(h.inbound.send(text(r#"{"type":"reboot","data":{}}"#)).is_ok());
        assert!(
            h.inbound
                .send(text(
                    r#"{"type":"decrease_temperature","data":{"deviceId":"ghost","amount":5.0}}"#
                ))
                .is_ok()
        );

        let second = next_snapshot(&mut h).await;
        assert_eq!(*h.state.borrow(), SessionState::Active);
        assert_eq!(second.len(), 2);
        assert_eq!(temperature_of(&second, "A"), 37.0);
        assert!(h.store.get(&DeviceId::from("ghost")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_closes_once_and_stops_emission() {
        let mut h = start(&CancellationToken::new());
        let _ = next_snapshot(&mut h).await;

        assert!(h.inbound.send(Err("connection reset".to_string())).is_ok());
        let Ok(report) = h.task.await else {
            panic!("session task panicked");
        };

        assert_eq!(
            report.cause,
            CloseCause::ReadFailed("transport read failed: connection reset".into())
        );
        assert_eq!(*h.state.borrow(), SessionState::Closed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);

        let before = h.store.snapshot_sorted().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.store.snapshot_sorted().await, before);

        while h.outbound.recv().await.is_some() {}
        assert_eq!(report.emitter.frames_emitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_closes_session() {
        let mut h = start(&CancellationToken::new());
        let _ = next_snapshot(&mut h).await;
        h.outbound.close();

        let Ok(report) = h.task.await else {
            panic!("session task panicked");
        };
        assert!(matches!(report.cause, CloseCause::WriteFailed(_)));
        assert_eq!(*h.state.borrow(), SessionState::Closed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert_eq!(report.emitter.frames_emitted, 1);
        assert!(h.inbound.send(text(r#"{"type":"reboot"}"#)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out_and_closes_session() {
        let h = start(&CancellationToken::new());
        h.stalled.store(true, Ordering::SeqCst);

        let Ok(report) = h.task.await else {
            panic!("session task panicked");
        };
        let CloseCause::WriteFailed(reason) = &report.cause else {
            panic!("expected a write failure, got {:?}", report.cause);
        };
        assert!(reason.contains("timed out"));
        assert_eq!(*h.state.borrow(), SessionState::Closed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert_eq!(report.emitter.frames_emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overflowed_temperature_closes_without_emitting() {
        let mut h = start(&CancellationToken::new());
        let _ = next_snapshot(&mut h).await;

        let frame = r#"{"type":"decrease_temperature","data":{"deviceId":"A","amount":1e308}}"#;
        assert!(h.inbound.send(text(frame)).is_ok());
        assert!(h.inbound.send(text(frame)).is_ok());

        let Ok(report) = h.task.await else {
            panic!("session task panicked");
        };
        assert!(matches!(report.cause, CloseCause::SerializationFailed(_)));
        assert_eq!(report.ingress.commands_applied, 2);
        assert_eq!(report.emitter.frames_emitted, 1);
        assert_eq!(*h.state.borrow(), SessionState::Closed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn client_close_frame_ends_session() {
        let mut h = start(&CancellationToken::new());
        let _ = next_snapshot(&mut h).await;
        assert!(h.inbound.send(Ok(Message::Close(None))).is_ok());

        let Ok(report) = h.task.await else {
            panic!("session task panicked");
        };
        assert_eq!(report.cause, CloseCause::ClientClosed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_shutdown_cancels_session() {
        let shutdown = CancellationToken::new();
        let mut h = start(&shutdown);
        let _ = next_snapshot(&mut h).await;

        shutdown.cancel();
        let Ok(report) = h.task.await else {
            panic!("session task panicked");
        };
        assert_eq!(report.cause, CloseCause::ServerShutdown);
        assert_eq!(*h.state.borrow(), SessionState::Closed);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let settings = settings();
        let shutdown = CancellationToken::new();
        let first = TelemetrySession::new(&settings, &shutdown);
        let second = TelemetrySession::new(&settings, &shutdown);
        assert_ne!(first.id(), second.id());

        let a = DeviceId::from("A");
        assert!(
            first
                .store()
                .upsert_delta(&a, |s| s.temperature -= 10.0)
                .await
                .is_ok()
        );
        let Some(untouched) = second.store().get(&a).await else {
            panic!("A should be tracked");
        };
        assert_eq!(untouched.temperature, 35.0);
    }
}
