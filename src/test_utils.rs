//! Test doubles for transports and credentials
//!
//! Scripted connectors drive sessions through faults without a network.
//! Intended for `start_paused` tokio tests: idle transports never resolve
//! `recv`, so virtual time advances through the receive timeouts.

use crate::rest::{CredentialSource, RestError};
use crate::ws::connection::{Connector, Frame, Transport, TransportError};
use crate::ws::handler::{handler_fn, SharedHandler, StreamMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How a mock transport answers pings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingBehavior {
    Pong,
    Fail,
    /// Never answers
    Silent,
}

/// Outcome of one scripted connect
pub enum ConnectPlan {
    Fail,
    /// Never completes; exercises the connect timeout
    Hang,
    Accept { frames: Vec<Frame>, ping: PingBehavior },
}

impl ConnectPlan {
    /// Connect that yields `texts` and then stays idle, answering pings
    pub fn accept(texts: Vec<&str>) -> Self {
        ConnectPlan::Accept {
            frames: texts.into_iter().map(|t| Frame::Text(t.to_string())).collect(),
            ping: PingBehavior::Pong,
        }
    }

    fn idle() -> Self {
        ConnectPlan::Accept {
            frames: Vec::new(),
            ping: PingBehavior::Pong,
        }
    }
}

pub struct MockTransport {
    frames: VecDeque<Frame>,
    ping: PingBehavior,
    pings: Arc<AtomicUsize>,
    /// Closed by the session
    closed: Arc<AtomicBool>,
    /// A scripted close frame was handed out
    peer_closed: bool,
}

impl MockTransport {
    /// Transport with no frames queued
    pub fn idle(ping: PingBehavior) -> Self {
        Self {
            frames: VecDeque::new(),
            ping,
            pings: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            peer_closed: false,
        }
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(Frame::Closed);
        }
        match self.frames.pop_front() {
            Some(Frame::Closed) => {
                self.peer_closed = true;
                Ok(Frame::Closed)
            }
            Some(frame) => Ok(frame),
            None if self.peer_closed => Ok(Frame::Closed),
            None => std::future::pending().await,
        }
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.peer_closed || self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        match self.ping {
            PingBehavior::Pong => Ok(()),
            PingBehavior::Fail => Err(TransportError::ConnectionClosed),
            PingBehavior::Silent => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that replays a script, then falls back to a fixed plan
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectPlan>>,
    fallback: fn() -> ConnectPlan,
    connects: Mutex<Vec<(String, Instant)>>,
    transports: Mutex<Vec<Arc<AtomicBool>>>,
    pings: Arc<AtomicUsize>,
}

impl MockConnector {
    /// Replays `script`; later connects succeed and stay idle
    pub fn new(script: Vec<ConnectPlan>) -> Self {
        Self::with_fallback(script, ConnectPlan::idle)
    }

    /// Every connect fails
    pub fn failing() -> Self {
        Self::with_fallback(Vec::new(), || ConnectPlan::Fail)
    }

    /// Every connect succeeds and stays idle
    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    fn with_fallback(script: Vec<ConnectPlan>, fallback: fn() -> ConnectPlan) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            connects: Mutex::new(Vec::new()),
            transports: Mutex::new(Vec::new()),
            pings: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    /// Virtual time of each connect call
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn connect_urls(&self) -> Vec<String> {
        self.connects.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Connect calls whose URL ends with `suffix`
    pub fn connects_to(&self, suffix: &str) -> usize {
        self.connects
            .lock()
            .iter()
            .filter(|(url, _)| url.ends_with(suffix))
            .count()
    }

    pub fn closed_count(&self) -> usize {
        self.transports
            .lock()
            .iter()
            .filter(|closed| closed.load(Ordering::SeqCst))
            .count()
    }

    /// Every transport handed out has been closed
    pub fn all_closed(&self) -> bool {
        self.transports
            .lock()
            .iter()
            .all(|closed| closed.load(Ordering::SeqCst))
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.connects.lock().push((url.to_string(), Instant::now()));
        let plan = self.script.lock().pop_front().unwrap_or_else(self.fallback);

        match plan {
            ConnectPlan::Fail => Err(TransportError::ConnectionFailed(
                "failed to lookup address information".to_string(),
            )),
            ConnectPlan::Hang => std::future::pending().await,
            ConnectPlan::Accept { frames, ping } => {
                let closed = Arc::new(AtomicBool::new(false));
                self.transports.lock().push(Arc::clone(&closed));
                Ok(Box::new(MockTransport {
                    frames: frames.into(),
                    ping,
                    pings: Arc::clone(&self.pings),
                    closed,
                    peer_closed: false,
                }))
            }
        }
    }
}

/// Credential source replaying scripted keys
pub struct MockCredentials {
    issued: Mutex<VecDeque<String>>,
    /// `None` fails that renewal; once empty, renewals echo the key back
    renewals: Mutex<VecDeque<Option<String>>>,
    issue_calls: AtomicUsize,
    renew_calls: AtomicUsize,
    revoked: Mutex<Vec<String>>,
}

impl MockCredentials {
    pub fn new(issued: Vec<&str>, renewals: Vec<Option<&str>>) -> Self {
        Self {
            issued: Mutex::new(issued.into_iter().map(str::to_string).collect()),
            renewals: Mutex::new(
                renewals
                    .into_iter()
                    .map(|key| key.map(str::to_string))
                    .collect(),
            ),
            issue_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
            revoked: Mutex::new(Vec::new()),
        }
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }
}

#[async_trait]
impl CredentialSource for MockCredentials {
    async fn issue_key(&self) -> Result<String, RestError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.issued.lock().pop_front().ok_or(RestError::Status {
            status: 401,
            body: r#"{"code":-2015,"msg":"Invalid API-key"}"#.to_string(),
        })
    }

    async fn renew_key(&self, key: &str) -> Result<String, RestError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        match self.renewals.lock().pop_front() {
            Some(Some(next)) => Ok(next),
            Some(None) => Err(RestError::Status {
                status: 503,
                body: "Service Unavailable".to_string(),
            }),
            None => Ok(key.to_string()),
        }
    }

    async fn revoke_key(&self, key: &str) -> Result<(), RestError> {
        self.revoked.lock().push(key.to_string());
        Ok(())
    }
}

/// Handler forwarding every message to a channel
pub fn recording_handler() -> (SharedHandler, mpsc::UnboundedReceiver<StreamMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = handler_fn(move |msg: StreamMessage| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(msg);
            Ok(())
        }
    });
    (handler, rx)
}
