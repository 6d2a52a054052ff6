//! Reconnecting stream session
//!
//! One session owns one logical stream. Its background task runs the
//! connect -> receive -> probe -> reconnect cycle until the reconnect budget
//! runs out or the session is cancelled.
//!
//! States: `Connecting -> Connected (<-> Probing) -> Reconnecting -> Connecting`,
//! ending in `Terminated`. `Cancelled` is reachable from every state.

use crate::core::StreamId;
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics::StreamMetrics;
use crate::log_ws;
use crate::ws::backoff::ReconnectPolicy;
use crate::ws::connection::{Connector, Frame, Transport, TransportError};
use crate::ws::handler::{decode_document, SharedHandler, StreamMessage};
use crate::ws::ping::LivenessProbe;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::Level;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connect attempt in flight
    Connecting,
    /// Socket open, waiting for frames
    Connected,
    /// Receive timed out, waiting for a pong
    Probing,
    /// Waiting out the backoff before the next connect
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect budget exhausted; the session will not revive itself
    Terminated,
    /// Stopped by its owner
    Cancelled,
}

impl SessionState {
    /// No further connects will happen from this state
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Cancelled)
    }
}

/// Why one connection attempt ended
#[derive(Debug, thiserror::Error)]
enum Disconnect {
    #[error("cancelled")]
    Cancelled,
    #[error("connect failed: {0}")]
    Connect(TransportError),
    #[error("connection lost: {0}")]
    Lost(TransportError),
    #[error("liveness probe failed: {0}")]
    Probe(TransportError),
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),
}

/// Background half of a session
struct SessionTask {
    id: StreamId,
    url: String,
    handler: SharedHandler,
    connector: Arc<dyn Connector>,
    config: Arc<StreamConfig>,
    policy: ReconnectPolicy,
    probe: LivenessProbe,
    attempts: Arc<AtomicU32>,
    state: Arc<watch::Sender<SessionState>>,
    shutdown: watch::Receiver<bool>,
    metrics: Arc<StreamMetrics>,
}

/// Resolves once the owner asked for shutdown or went away
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl SessionTask {
    async fn run(self) {
        loop {
            let disconnect = self.connect_and_stream().await;
            if let Disconnect::Cancelled = disconnect {
                self.state.send_replace(SessionState::Cancelled);
                return;
            }

            if let Disconnect::Handler(_) = disconnect {
                self.metrics.record_handler_failure();
                log_ws!(Level::WARN, stream = %self.id, error = %disconnect, "Stream disconnected");
            } else {
                log_ws!(
                    Level::DEBUG,
                    stream = %self.id,
                    error = %disconnect,
                    "Stream disconnected"
                );
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.policy.should_reconnect(attempt) {
                log_ws!(
                    Level::ERROR,
                    stream = %self.id,
                    max_reconnects = self.policy.max_attempts,
                    "Max reconnections reached, giving up"
                );
                self.metrics.record_terminated();
                self.state.send_replace(SessionState::Terminated);
                return;
            }

            let delay = self.policy.delay(attempt);
            self.metrics.record_reconnect();
            log_ws!(
                Level::INFO,
                stream = %self.id,
                reconnects_left = self.policy.max_attempts - attempt,
                wait_secs = delay.as_secs(),
                "Reconnecting"
            );
            self.state.send_replace(SessionState::Reconnecting { attempt, delay });

            tokio::select! {
                biased;
                _ = wait_for_shutdown(self.shutdown.clone()) => {
                    self.state.send_replace(SessionState::Cancelled);
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// One connect attempt; the transport never outlives it
    async fn connect_and_stream(&self) -> Disconnect {
        self.state.send_replace(SessionState::Connecting);

        let connect = timeout(self.config.connect_timeout(), self.connector.connect(&self.url));
        let mut transport = tokio::select! {
            biased;
            _ = wait_for_shutdown(self.shutdown.clone()) => return Disconnect::Cancelled,
            result = connect => match result {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => return Disconnect::Connect(e),
                Err(_) => return Disconnect::Connect(TransportError::Timeout),
            },
        };

        self.attempts.store(0, Ordering::SeqCst);
        self.metrics.record_connect();
        self.state.send_replace(SessionState::Connected);
        log_ws!(Level::INFO, stream = %self.id, "Connected");

        let disconnect = tokio::select! {
            biased;
            _ = wait_for_shutdown(self.shutdown.clone()) => Disconnect::Cancelled,
            disconnect = self.receive_loop(transport.as_mut()) => disconnect,
        };

        // Leave half the grace period for the owner's join
        let close_budget = self.config.close_grace() / 2;
        match timeout(close_budget, transport.close()).await {
            Ok(Ok(())) => log_ws!(Level::DEBUG, stream = %self.id, "Socket closed"),
            Ok(Err(e)) => log_ws!(Level::DEBUG, stream = %self.id, error = %e, "Close failed"),
            Err(_) => log_ws!(Level::DEBUG, stream = %self.id, "Close timed out"),
        }

        disconnect
    }

    async fn receive_loop(&self, transport: &mut dyn Transport) -> Disconnect {
        loop {
            match timeout(self.config.recv_timeout(), transport.recv()).await {
                Ok(Ok(Frame::Text(text))) => {
                    if let Err(disconnect) = self.dispatch(text.into_bytes()).await {
                        return disconnect;
                    }
                }
                Ok(Ok(Frame::Binary(data))) => {
                    if let Err(disconnect) = self.dispatch(data).await {
                        return disconnect;
                    }
                }
                // Silence or a close frame: find out whether the peer is still there
                Ok(Ok(Frame::Closed)) | Err(_) => {
                    self.state.send_replace(SessionState::Probing);
                    if let Err(e) = self.probe.check(&mut *transport).await {
                        return Disconnect::Probe(e);
                    }
                    log_ws!(Level::TRACE, stream = %self.id, "Ping OK, keeping connection alive");
                    self.state.send_replace(SessionState::Connected);
                }
                Ok(Err(e)) => return Disconnect::Lost(e),
            }
        }
    }

    /// Decode and hand one frame to the handler. Malformed frames are dropped.
    async fn dispatch(&self, payload: Vec<u8>) -> Result<(), Disconnect> {
        let len = payload.len();
        let document = match decode_document(payload) {
            Ok(document) => document,
            Err(e) => {
                self.metrics.record_decode_failure();
                log_ws!(
                    Level::ERROR,
                    stream = %self.id,
                    bytes = len,
                    error = %e,
                    "Error parsing message json"
                );
                return Ok(());
            }
        };

        let message = StreamMessage::from_document(self.id.route(), self.id.name(), document);
        let stream = message.stream.clone();
        // A panicking handler is a handler fault like any other
        match AssertUnwindSafe(self.handler.handle(message)).catch_unwind().await {
            Ok(result) => result.map_err(Disconnect::Handler)?,
            Err(_) => {
                return Err(Disconnect::Handler(anyhow::anyhow!("handler panicked")));
            }
        }
        self.metrics.record_message(&stream);
        Ok(())
    }
}

/// One logical stream's connection, owned by the manager
pub struct ConnectionSession {
    id: StreamId,
    attempts: Arc<AtomicU32>,
    state: Arc<watch::Sender<SessionState>>,
    shutdown: watch::Sender<bool>,
    /// Task body, present until `start`
    pending: Option<SessionTask>,
    task: Option<JoinHandle<()>>,
    close_grace: Duration,
}

impl ConnectionSession {
    /// Build a session for `id`; nothing runs until `start`
    pub fn new(
        id: StreamId,
        handler: SharedHandler,
        connector: Arc<dyn Connector>,
        config: Arc<StreamConfig>,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        let state = Arc::new(state);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let attempts = Arc::new(AtomicU32::new(0));

        let task = SessionTask {
            url: id.url(&config.base_url),
            id: id.clone(),
            handler,
            connector,
            policy: config.reconnect_policy(),
            probe: LivenessProbe::new(config.ping_timeout()),
            config: Arc::clone(&config),
            attempts: Arc::clone(&attempts),
            state: Arc::clone(&state),
            shutdown: shutdown_rx,
            metrics,
        };

        Self {
            id,
            attempts,
            state,
            shutdown,
            pending: Some(task),
            task: None,
            close_grace: config.close_grace(),
        }
    }

    /// Schedule the connect loop. Returns immediately; a second call is a no-op.
    pub fn start(&mut self) {
        if let Some(task) = self.pending.take() {
            log_ws!(Level::DEBUG, stream = %self.id, url = %task.url, "Starting session");
            self.task = Some(tokio::spawn(task.run()));
        }
    }

    /// Stop the session and wait for its task to finish.
    ///
    /// Closes the socket if one is open. Safe to call repeatedly and before
    /// `start`. No handler call happens after this returns.
    pub async fn cancel(&mut self) {
        log_ws!(Level::WARN, stream = %self.id, "Cancelling");
        self.pending = None;
        self.shutdown.send_replace(true);

        if let Some(mut task) = self.task.take() {
            if timeout(self.close_grace, &mut task).await.is_err() {
                log_ws!(Level::WARN, stream = %self.id, "Session did not stop in time, aborting");
                task.abort();
                let _ = task.await;
            }
            log_ws!(Level::DEBUG, stream = %self.id, "Task cancelled");
        }

        self.state.send_replace(SessionState::Cancelled);
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change, including `Terminated`
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Consecutive failed attempts; 0 while connected
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Started, task still running, and not yet terminated or cancelled
    pub fn is_live(&self) -> bool {
        let running = self.task.as_ref().is_some_and(|task| !task.is_finished());
        running && !self.state().is_finished()
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        // Detached task sees this at its next suspension point and unwinds
        self.shutdown.send_replace(true);
    }
}
