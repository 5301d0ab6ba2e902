//! Keyed WebSocket connection manager.
//!
//! Each subscription key owns one upstream transport driven by its own task.
//! Handles connection lifecycle, automatic reconnection with exponential
//! backoff, and per-key message delivery.

use crate::event::ConnectionEvent;
use crate::monitor::{HealthSnapshot, PerformanceSnapshot, TrafficMeter};
use crate::transport::{
    Connector, DynConnector, MeteredConnector, Transport, TransportEvent, ABNORMAL_CLOSURE,
    NORMAL_CLOSURE,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-subscription message callback. Receives each parsed JSON frame.
pub type MessageCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum consecutive reconnects before a key is abandoned (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// How long a connection must stay open before its reconnect counter resets.
    /// 0 resets on the open event itself.
    pub stable_open_ms: u64,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
    /// Closed keys that keep reporting `Closed`; older ones fall back to `Unknown`.
    pub closed_key_retention: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            stable_open_ms: 1000,
            event_capacity: 256,
            closed_key_retention: 1024,
        }
    }
}

/// Transport readiness of one subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closing,
    Closed,
    /// No connection was ever created for the key.
    Unknown,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
///
/// attempt=0 -> base, attempt=1 -> 2*base, attempt=2 -> 4*base
pub fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.min(20);
    let delay = base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay.min(max_ms))
}

/// State shared between a connection task and the manager.
struct ConnectionShared {
    status: RwLock<ConnectionStatus>,
    /// Reconnects scheduled since the last stable open.
    attempt: AtomicU32,
}

impl ConnectionShared {
    fn new() -> Self {
        Self {
            status: RwLock::new(ConnectionStatus::Connecting),
            attempt: AtomicU32::new(0),
        }
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }

    fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }
}

struct ConnectionEntry {
    /// Identifies this generation of the key; replaced on every subscribe.
    id: Uuid,
    shared: Arc<ConnectionShared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

enum Slot {
    /// Owned by a running connection task.
    Live(ConnectionEntry),
    /// Unsubscribed; transport teardown still in progress.
    Retiring(ConnectionEntry),
    /// Unsubscribed, abandoned, or closed normally by the peer.
    /// Carries the burial order for eviction.
    Closed(u64),
}

struct ManagerInner {
    config: ConnectionConfig,
    connector: MeteredConnector,
    meter: Arc<TrafficMeter>,
    slots: Mutex<BTreeMap<String, Slot>>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown_token: CancellationToken,
    /// Runtime connection tasks are spawned on.
    runtime: Option<Handle>,
    closed_seq: AtomicU64,
}

impl ManagerInner {
    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }

    /// Mark `key` closed, evicting the oldest closed keys past the retention limit.
    fn bury(&self, slots: &mut BTreeMap<String, Slot>, key: String) {
        let seq = self.closed_seq.fetch_add(1, Ordering::Relaxed);
        slots.insert(key, Slot::Closed(seq));

        let limit = self.config.closed_key_retention;
        let mut closed: Vec<(u64, String)> = slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Closed(seq) => Some((*seq, key.clone())),
                _ => None,
            })
            .collect();
        if closed.len() <= limit {
            return;
        }
        closed.sort_unstable();
        let excess = closed.len() - limit;
        for (_, key) in closed.into_iter().take(excess) {
            slots.remove(&key);
        }
    }
}

/// WebSocket connection manager.
///
/// Construct once at application start and share by `Arc`.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Create a manager with a fresh traffic meter.
    pub fn new(config: ConnectionConfig, connector: DynConnector) -> Self {
        Self::with_meter(config, connector, Arc::new(TrafficMeter::new()))
    }

    /// Create a manager recording traffic into `meter`.
    ///
    /// Every transport is opened through a [`MeteredConnector`] wrapping `connector`.
    /// Connection tasks run on the runtime current at construction, if any.
    pub fn with_meter(
        config: ConnectionConfig,
        connector: DynConnector,
        meter: Arc<TrafficMeter>,
    ) -> Self {
        Self::build(config, connector, meter, Handle::try_current().ok())
    }

    /// Create a manager whose connection tasks run on `runtime`.
    ///
    /// `subscribe` may then be called from threads outside any runtime.
    pub fn with_runtime(
        config: ConnectionConfig,
        connector: DynConnector,
        runtime: Handle,
    ) -> Self {
        Self::build(config, connector, Arc::new(TrafficMeter::new()), Some(runtime))
    }

    fn build(
        config: ConnectionConfig,
        connector: DynConnector,
        meter: Arc<TrafficMeter>,
        runtime: Option<Handle>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(ManagerInner {
                connector: MeteredConnector::new(connector, meter.clone()),
                meter,
                config,
                slots: Mutex::new(BTreeMap::new()),
                events,
                shutdown_token: CancellationToken::new(),
                runtime,
                closed_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Open a connection for `key`, replacing any previous one.
    ///
    /// The previous transport (if any) is closed before the new one connects.
    /// Failures are reported through [`events`](Self::events), never returned.
    /// Without a runtime to spawn on, the key is abandoned with a terminal failure.
    pub fn subscribe<F>(&self, key: impl Into<String>, url: impl Into<String>, on_message: F)
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        let key = key.into();
        let url = url.into();
        let id = Uuid::new_v4();
        let shared = Arc::new(ConnectionShared::new());
        let cancel = self.inner.shutdown_token.child_token();

        let mut slots = self.inner.slots.lock();
        let previous = match slots.remove(&key) {
            Some(Slot::Live(mut entry)) | Some(Slot::Retiring(mut entry)) => {
                info!(key = %key, old_id = %entry.id, "Replacing existing subscription");
                entry.cancel.cancel();
                entry.task.take()
            }
            Some(Slot::Closed(_)) | None => None,
        };

        let Some(runtime) = self.inner.runtime() else {
            error!(key = %key, url = %url, "No tokio runtime to run the connection on");
            self.inner.emit(ConnectionEvent::Error {
                key: key.clone(),
                message: "no tokio runtime available".to_string(),
            });
            self.inner.emit(ConnectionEvent::TerminalFailure {
                key: key.clone(),
                attempts: 0,
            });
            self.inner.bury(&mut slots, key);
            return;
        };

        let task = ConnectionTask {
            key: key.clone(),
            url: url.clone(),
            id,
            shared: shared.clone(),
            cancel: cancel.clone(),
            on_message: Arc::new(on_message),
            inner: self.inner.clone(),
        };
        let handle = runtime.spawn(task.run(previous));

        debug!(key = %key, url = %url, %id, "Subscription registered");
        slots.insert(
            key,
            Slot::Live(ConnectionEntry {
                id,
                shared,
                cancel,
                task: Some(handle),
            }),
        );
    }

    /// Close the connection for `key` with a normal closure. No reconnects follow.
    ///
    /// Returns immediately; the transport finishes closing in the background.
    pub fn unsubscribe(&self, key: &str) {
        let mut slots = self.inner.slots.lock();
        match slots.remove(key) {
            Some(Slot::Live(entry)) => {
                info!(key, "Unsubscribing");
                entry.shared.set_status(ConnectionStatus::Closing);
                entry.cancel.cancel();
                slots.insert(key.to_string(), Slot::Retiring(entry));
            }
            Some(other) => {
                slots.insert(key.to_string(), other);
            }
            None => debug!(key, "Unsubscribe for unknown key ignored"),
        }
    }

    /// Unsubscribe every live key.
    pub fn unsubscribe_all(&self) {
        let keys: Vec<String> = self
            .inner
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(key, _)| key.clone())
            .collect();
        info!(count = keys.len(), "Unsubscribing all");
        for key in keys {
            self.unsubscribe(&key);
        }
    }

    /// Current transport readiness for `key`.
    pub fn status(&self, key: &str) -> ConnectionStatus {
        match self.inner.slots.lock().get(key) {
            Some(Slot::Live(entry)) | Some(Slot::Retiring(entry)) => entry.shared.status(),
            Some(Slot::Closed(_)) => ConnectionStatus::Closed,
            None => ConnectionStatus::Unknown,
        }
    }

    /// Keys whose transport is connecting or open, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        self.inner
            .slots
            .lock()
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Live(entry)
                    if matches!(
                        entry.shared.status(),
                        ConnectionStatus::Connecting | ConnectionStatus::Open
                    ) =>
                {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// No transport is live or still closing.
    pub fn is_idle(&self) -> bool {
        self.inner
            .slots
            .lock()
            .values()
            .all(|slot| matches!(slot, Slot::Closed(_)))
    }

    /// Aggregate health over every key that still has a transport.
    ///
    /// Keys still closing after an unsubscribe count as unhealthy until their
    /// transport is gone.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        let max = self.inner.config.max_reconnect_attempts;
        let slots = self.inner.slots.lock();
        let mut total_connections = 0;
        let mut healthy_connections = 0;
        let mut issues = Vec::new();

        for (key, slot) in slots.iter() {
            let entry = match slot {
                Slot::Live(entry) | Slot::Retiring(entry) => entry,
                Slot::Closed(_) => continue,
            };
            total_connections += 1;

            let status = entry.shared.status();
            if status == ConnectionStatus::Open {
                healthy_connections += 1;
                continue;
            }

            let attempt = entry.shared.attempt();
            let issue = match (attempt, max) {
                (0, _) => format!("{key}: {status}"),
                (n, 0) => format!("{key}: {status} (reconnect attempt {n})"),
                (n, m) => format!("{key}: {status} (reconnect attempt {n}/{m})"),
            };
            issues.push(issue);
        }

        HealthSnapshot {
            total_connections,
            healthy_connections,
            issues,
            timestamp: Utc::now(),
        }
    }

    /// Traffic counters since monitoring start or the last reset.
    pub fn performance_snapshot(&self) -> PerformanceSnapshot {
        self.inner.meter.snapshot()
    }

    pub fn reset_performance(&self) {
        info!("Performance counters reset");
        self.inner.meter.reset();
    }

    pub fn meter(&self) -> Arc<TrafficMeter> {
        self.inner.meter.clone()
    }

    /// Receive lifecycle events emitted after this call.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Unsubscribe everything and refuse further connection work.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.unsubscribe_all();
        self.inner.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown_token.is_cancelled()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.shutdown_token.cancel();
    }
}

/// How one transport session ended.
enum Outcome {
    /// Cancelled by unsubscribe, replacement, or shutdown.
    Cancelled,
    /// Peer closed with 1000.
    NormalClosure,
    /// Any other closure or a retryable connect failure.
    Abnormal,
    /// Connect failure that retrying cannot fix.
    Fatal,
}

struct ConnectionTask {
    key: String,
    url: String,
    id: Uuid,
    shared: Arc<ConnectionShared>,
    cancel: CancellationToken,
    on_message: MessageCallback,
    inner: Arc<ManagerInner>,
}

impl ConnectionTask {
    async fn run(self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            // Replaced transport must finish closing before this one opens.
            let _ = previous.await;
        }

        let config = &self.inner.config;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.shared.set_status(ConnectionStatus::Connecting);

            match self.connect_and_pump().await {
                Outcome::Cancelled => break,
                Outcome::NormalClosure => {
                    info!(key = %self.key, "Closed normally by peer, not reconnecting");
                    self.retire();
                    return;
                }
                Outcome::Fatal => {
                    let attempts = self.shared.attempt();
                    error!(key = %self.key, url = %self.url, "Unrecoverable connection error, abandoning subscription");
                    self.inner.emit(ConnectionEvent::TerminalFailure {
                        key: self.key.clone(),
                        attempts,
                    });
                    self.retire();
                    return;
                }
                Outcome::Abnormal => {}
            }

            self.shared.set_status(ConnectionStatus::Closed);
            if self.cancel.is_cancelled() {
                break;
            }

            let attempt = self.shared.attempt();
            if config.max_reconnect_attempts > 0 && attempt >= config.max_reconnect_attempts {
                error!(key = %self.key, attempts = attempt, "Max reconnection attempts reached");
                self.inner.emit(ConnectionEvent::TerminalFailure {
                    key: self.key.clone(),
                    attempts: attempt,
                });
                self.retire();
                return;
            }

            let delay = backoff_delay(
                config.reconnect_base_delay_ms,
                config.reconnect_max_delay_ms,
                attempt,
            );
            let attempt = attempt.saturating_add(1);
            self.shared.attempt.store(attempt, Ordering::SeqCst);
            self.inner.meter.record_reconnect();

            warn!(key = %self.key, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            self.inner.emit(ConnectionEvent::ReconnectScheduled {
                key: self.key.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
            });

            // Wait for delay OR cancellation (unsubscribe must not resurrect the key)
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => {
                    debug!(key = %self.key, "Cancelled during backoff");
                    break;
                }
            }
        }

        self.retire();
    }

    async fn connect_and_pump(&self) -> Outcome {
        let connected = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Outcome::Cancelled,
            result = self.inner.connector.connect(&self.url) => result,
        };

        let mut transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                warn!(key = %self.key, url = %self.url, error = %e, "Connect failed");
                let outcome = if e.is_retryable() {
                    Outcome::Abnormal
                } else {
                    Outcome::Fatal
                };
                self.inner.emit(ConnectionEvent::Error {
                    key: self.key.clone(),
                    message: e.to_string(),
                });
                return outcome;
            }
        };

        self.shared.set_status(ConnectionStatus::Open);
        info!(key = %self.key, url = %self.url, "WebSocket connected");
        self.inner.emit(ConnectionEvent::Opened {
            key: self.key.clone(),
        });

        let stable_after = Duration::from_millis(self.inner.config.stable_open_ms);
        let mut stabilized = stable_after.is_zero();
        if stabilized {
            self.shared.attempt.store(0, Ordering::SeqCst);
        }
        let stable_timer = tokio::time::sleep(stable_after);
        tokio::pin!(stable_timer);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.close_transport(transport.as_mut()).await;
                    return Outcome::Cancelled;
                }

                () = &mut stable_timer, if !stabilized => {
                    stabilized = true;
                    self.shared.attempt.store(0, Ordering::SeqCst);
                    debug!(key = %self.key, "Connection stable, reconnect counter reset");
                }

                event = transport.recv() => match event {
                    TransportEvent::Text(text) => self.deliver(&text),
                    TransportEvent::Binary(data) => match String::from_utf8(data) {
                        Ok(text) => self.deliver(&text),
                        Err(_) => {
                            self.inner.meter.record_parse_error();
                            warn!(key = %self.key, "Dropping non-UTF-8 binary frame");
                        }
                    },
                    TransportEvent::Closed { code, reason } => {
                        if code == NORMAL_CLOSURE {
                            info!(key = %self.key, %reason, "WebSocket closed by server");
                        } else {
                            warn!(key = %self.key, code, %reason, "WebSocket closed abnormally");
                        }
                        self.inner.emit(ConnectionEvent::Closed {
                            key: self.key.clone(),
                            code,
                            reason,
                        });
                        return if code == NORMAL_CLOSURE {
                            Outcome::NormalClosure
                        } else {
                            Outcome::Abnormal
                        };
                    }
                },
            }
        }
    }

    async fn close_transport(&self, transport: &mut dyn Transport) {
        self.shared.set_status(ConnectionStatus::Closing);
        let (code, reason) = match transport.close(NORMAL_CLOSURE, "unsubscribed").await {
            Ok(()) => (NORMAL_CLOSURE, "unsubscribed".to_string()),
            Err(e) => {
                warn!(key = %self.key, ?e, "Failed to send Close frame");
                (ABNORMAL_CLOSURE, e.to_string())
            }
        };
        self.inner.emit(ConnectionEvent::Closed {
            key: self.key.clone(),
            code,
            reason,
        });
    }

    /// Parse one frame and hand it to the subscriber.
    ///
    /// Unparseable frames and panicking callbacks are logged and counted;
    /// neither affects the connection.
    fn deliver(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                self.inner.meter.record_parse_error();
                warn!(key = %self.key, error = %e, "Dropping unparseable frame");
                return;
            }
        };

        let callback = &self.on_message;
        if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
            self.inner.meter.record_callback_failure();
            error!(key = %self.key, "Message callback panicked, continuing delivery");
        }
    }

    /// Release the key if this task still owns it.
    fn retire(&self) {
        let mut slots = self.inner.slots.lock();
        let owned = matches!(
            slots.get(&self.key),
            Some(Slot::Live(entry)) | Some(Slot::Retiring(entry)) if entry.id == self.id
        );
        self.shared.set_status(ConnectionStatus::Closed);
        if owned {
            self.inner.bury(&mut slots, self.key.clone());
            debug!(key = %self.key, id = %self.id, "Connection retired");
        }
    }
}
