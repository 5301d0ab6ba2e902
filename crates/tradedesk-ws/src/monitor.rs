//! Health and performance monitoring.
//!
//! `TrafficMeter` accumulates counters fed by the metered transport and the
//! connection manager. `HealthSnapshot` is never stored: the manager derives
//! it from current connection states on every call.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time summary of connection states.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub total_connections: usize,
    /// Connections whose transport is open.
    pub healthy_connections: usize,
    /// Human-readable description of every non-open connection.
    pub issues: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthSnapshot {
    /// All known connections are open.
    pub fn is_healthy(&self) -> bool {
        self.healthy_connections == self.total_connections
    }
}

/// Traffic counters accumulated since monitoring start or the last reset.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub messages_received: u64,
    /// Frame payload bytes received (text length or binary size).
    pub bytes_received: u64,
    pub reconnect_attempts: u64,
    pub parse_errors: u64,
    pub callback_failures: u64,
    pub uptime_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl PerformanceSnapshot {
    /// Average inbound message rate over the monitoring window.
    pub fn messages_per_sec(&self) -> f64 {
        if self.uptime_ms == 0 {
            return 0.0;
        }
        self.messages_received as f64 * 1000.0 / self.uptime_ms as f64
    }
}

/// Shared traffic counters.
///
/// Thread-safe via atomics; cloned behind an `Arc` into every metered transport.
pub struct TrafficMeter {
    messages: AtomicU64,
    bytes: AtomicU64,
    reconnects: AtomicU64,
    parse_errors: AtomicU64,
    callback_failures: AtomicU64,
    started: RwLock<(Instant, DateTime<Utc>)>,
}

impl Default for TrafficMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficMeter {
    pub fn new() -> Self {
        Self {
            messages: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
            started: RwLock::new((Instant::now(), Utc::now())),
        }
    }

    /// Record one inbound frame of `len` bytes.
    pub fn record_frame(&self, len: usize) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero all counters and restart the uptime clock.
    pub fn reset(&self) {
        let mut started = self.started.write();
        self.messages.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
        self.parse_errors.store(0, Ordering::Relaxed);
        self.callback_failures.store(0, Ordering::Relaxed);
        *started = (Instant::now(), Utc::now());
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let (started_instant, started_at) = *self.started.read();
        PerformanceSnapshot {
            messages_received: self.messages.load(Ordering::Relaxed),
            bytes_received: self.bytes.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnects.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            uptime_ms: started_instant.elapsed().as_millis() as u64,
            started_at,
        }
    }
}
