//! Connection lifecycle events.
//!
//! Delivered to observers through [`ConnectionManager::events`](crate::ConnectionManager::events).

use serde::Serialize;
use std::time::Duration;

/// Lifecycle notification for one subscription key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Transport opened.
    Opened { key: String },
    /// Transport closed (by us or by the peer).
    Closed {
        key: String,
        code: u16,
        reason: String,
    },
    /// A reconnect was scheduled after an abnormal closure.
    ReconnectScheduled {
        key: String,
        /// 1-based count of reconnects scheduled since the last stable open.
        attempt: u32,
        delay_ms: u64,
    },
    /// Reconnect attempts exhausted; the key stays inert until re-subscribed.
    TerminalFailure { key: String, attempts: u32 },
    /// Transport-level error (connect failure, invalid URL).
    Error { key: String, message: String },
}

impl ConnectionEvent {
    /// Subscription key the event belongs to.
    pub fn key(&self) -> &str {
        match self {
            Self::Opened { key }
            | Self::Closed { key, .. }
            | Self::ReconnectScheduled { key, .. }
            | Self::TerminalFailure { key, .. }
            | Self::Error { key, .. } => key,
        }
    }

    /// Short event name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "opened",
            Self::Closed { .. } => "closed",
            Self::ReconnectScheduled { .. } => "reconnect_scheduled",
            Self::TerminalFailure { .. } => "terminal_failure",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminalFailure { .. })
    }

    /// Scheduled delay, for `ReconnectScheduled` events.
    pub fn reconnect_delay(&self) -> Option<Duration> {
        match self {
            Self::ReconnectScheduled { delay_ms, .. } => Some(Duration::from_millis(*delay_ms)),
            _ => None,
        }
    }
}
