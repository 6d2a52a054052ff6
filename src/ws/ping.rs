//! Liveness probe for silent connections
//!
//! When no data arrives within the receive timeout the session sends a ping
//! and waits for the pong. A failed or late pong means the socket is dead.

use crate::ws::connection::{Transport, TransportError};
use std::time::Duration;
use tokio::time::timeout;

/// Ping/pong check with a bounded wait
#[derive(Debug, Clone, Copy)]
pub struct LivenessProbe {
    /// How long to wait for the pong
    pong_timeout: Duration,
}

impl LivenessProbe {
    pub fn new(pong_timeout: Duration) -> Self {
        Self { pong_timeout }
    }

    /// Ping the peer; `Ok` only if the pong arrived in time
    pub async fn check(&self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        match timeout(self.pong_timeout, transport.ping()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Default for LivenessProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
