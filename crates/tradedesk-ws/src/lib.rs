//! Keyed WebSocket subscription manager for live market data.
//!
//! Provides:
//! - One upstream connection per subscription key, replaced wholesale on re-subscribe
//! - Automatic reconnection with capped exponential backoff
//! - Per-key message callbacks with malformed-frame and panic isolation
//! - Health and performance snapshots for status panels
//! - Connection lifecycle events over a broadcast channel

pub mod connection;
pub mod error;
pub mod event;
pub mod mock;
pub mod monitor;
pub mod transport;

pub use connection::{
    backoff_delay, ConnectionConfig, ConnectionManager, ConnectionStatus, MessageCallback,
};
pub use error::{WsError, WsResult};
pub use event::ConnectionEvent;
pub use monitor::{HealthSnapshot, PerformanceSnapshot, TrafficMeter};
pub use transport::{
    BoxFuture, Connector, DynConnector, MeteredConnector, Transport, TransportEvent,
    TungsteniteConnector, ABNORMAL_CLOSURE, NORMAL_CLOSURE, NO_STATUS_RECEIVED,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
