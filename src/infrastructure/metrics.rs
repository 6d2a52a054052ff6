//! Metrics collection for stream monitoring
//!
//! Lock-free counters updated by sessions and the manager.
//! Per-stream delivery counts sit behind a read-mostly lock.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

/// Stream metrics collector
///
/// Shared by every session of one manager.
pub struct StreamMetrics {
    /// Messages handed to handlers successfully
    messages_delivered: AtomicU64,
    /// Frames that failed to decode
    decode_failures: AtomicU64,
    /// Handler errors (each forces a reconnect)
    handler_failures: AtomicU64,
    /// Reconnect attempts scheduled
    reconnects: AtomicU64,
    /// Successful connects
    connects: AtomicU64,
    /// Sessions that exhausted their reconnect budget
    sessions_terminated: AtomicU64,
    /// User stream listen key rotations
    key_rotations: AtomicU64,
    /// Last delivery timestamp (Unix millis)
    last_message_time: AtomicU64,
    /// Deliveries per stream name
    per_stream: RwLock<HashMap<String, u64>>,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Metrics snapshot for export
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub messages_delivered: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub reconnects: u64,
    pub connects: u64,
    pub sessions_terminated: u64,
    pub key_rotations: u64,
    pub message_rate: f64, // messages per second
    pub uptime_seconds: u64,
    pub per_stream: HashMap<String, u64>,
}

impl StreamMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            messages_delivered: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            sessions_terminated: AtomicU64::new(0),
            key_rotations: AtomicU64::new(0),
            last_message_time: AtomicU64::new(0),
            per_stream: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a delivered message for `stream`
    #[inline]
    pub fn record_message(&self, stream: &str) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
        self.update_last_message_time();

        let mut per_stream = self.per_stream.write();
        match per_stream.get_mut(stream) {
            Some(count) => *count += 1,
            // Allocate the key only on first sight
            None => {
                per_stream.insert(stream.to_string(), 1);
            }
        }
    }

    #[inline]
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminated(&self) {
        self.sessions_terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_rotation(&self) {
        self.key_rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Update last message timestamp
    #[inline]
    fn update_last_message_time(&self) {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_message_time.store(now, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.messages_delivered.load(Ordering::Relaxed);

        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            total as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            messages_delivered: total,
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            sessions_terminated: self.sessions_terminated.load(Ordering::Relaxed),
            key_rotations: self.key_rotations.load(Ordering::Relaxed),
            message_rate: rate,
            uptime_seconds: uptime,
            per_stream: self.per_stream.read().clone(),
        }
    }

    /// Milliseconds since the last delivery, capped at 10000ms
    pub fn staleness_ms(&self) -> u64 {
        let last = self.last_message_time.load(Ordering::Relaxed);
        if last == 0 {
            return 10000; // No messages yet
        }

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        now.saturating_sub(last).min(10000)
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}
