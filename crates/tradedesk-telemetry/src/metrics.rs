//! Prometheus metrics for tradedesk.
//!
//! Covers:
//! - Connection health (totals, per-key state)
//! - Inbound traffic and parse failures
//! - Reconnects and terminal failures
//! - Last traded price per symbol
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error surfaced on first use at startup.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_gauge, CounterVec,
    Encoder, Gauge, GaugeVec, IntGauge, TextEncoder,
};

/// Subscriptions the manager currently tracks.
pub static WS_CONNECTIONS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tradedesk_ws_connections_total",
        "Live subscriptions tracked by the connection manager"
    )
    .unwrap()
});

/// Subscriptions whose transport is open.
pub static WS_CONNECTIONS_HEALTHY: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tradedesk_ws_connections_healthy",
        "Live subscriptions with an open transport"
    )
    .unwrap()
});

/// Per-key transport state (1 = open, 0 = not open).
pub static WS_CONNECTION_OPEN: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tradedesk_ws_connection_open",
        "Transport state per subscription key (1=open)",
        &["key"]
    )
    .unwrap()
});

/// Messages received since the last performance reset.
pub static WS_MESSAGES_RECEIVED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tradedesk_ws_messages_received",
        "Inbound frames since the last performance reset"
    )
    .unwrap()
});

/// Bytes received since the last performance reset.
pub static WS_BYTES_RECEIVED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tradedesk_ws_bytes_received",
        "Inbound payload bytes since the last performance reset"
    )
    .unwrap()
});

/// Frames dropped because they were not valid JSON.
pub static WS_PARSE_ERRORS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tradedesk_ws_parse_errors",
        "Inbound frames dropped as unparseable since the last performance reset"
    )
    .unwrap()
});

/// Subscriber callbacks that panicked.
pub static WS_CALLBACK_FAILURES: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tradedesk_ws_callback_failures",
        "Message callbacks that panicked since the last performance reset"
    )
    .unwrap()
});

/// Seconds since monitoring start or the last reset.
pub static WS_UPTIME_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "tradedesk_ws_uptime_seconds",
        "Seconds since monitoring start or the last performance reset"
    )
    .unwrap()
});

/// Reconnects scheduled, by subscription key.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradedesk_ws_reconnect_total",
        "Reconnects scheduled per subscription key",
        &["key"]
    )
    .unwrap()
});

/// Subscriptions abandoned after exhausting reconnects.
pub static WS_TERMINAL_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradedesk_ws_terminal_failures_total",
        "Subscriptions abandoned after exhausting reconnects",
        &["key"]
    )
    .unwrap()
});

/// Lifecycle events by kind.
pub static WS_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tradedesk_ws_events_total",
        "Connection lifecycle events by kind",
        &["kind"]
    )
    .unwrap()
});

/// Last traded price per symbol.
pub static TICKER_LAST_PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tradedesk_ticker_last_price",
        "Last traded price per symbol",
        &["symbol"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Export the current health snapshot.
    pub fn connections(total: usize, healthy: usize) {
        WS_CONNECTIONS_TOTAL.set(total as i64);
        WS_CONNECTIONS_HEALTHY.set(healthy as i64);
    }

    pub fn connection_opened(key: &str) {
        WS_CONNECTION_OPEN.with_label_values(&[key]).set(1.0);
    }

    pub fn connection_closed(key: &str) {
        WS_CONNECTION_OPEN.with_label_values(&[key]).set(0.0);
    }

    /// Export the current performance snapshot.
    pub fn traffic(
        messages: u64,
        bytes: u64,
        parse_errors: u64,
        callback_failures: u64,
        uptime_ms: u64,
    ) {
        WS_MESSAGES_RECEIVED.set(messages as f64);
        WS_BYTES_RECEIVED.set(bytes as f64);
        WS_PARSE_ERRORS.set(parse_errors as f64);
        WS_CALLBACK_FAILURES.set(callback_failures as f64);
        WS_UPTIME_SECONDS.set(uptime_ms as f64 / 1000.0);
    }

    pub fn reconnect_scheduled(key: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[key]).inc();
    }

    pub fn terminal_failure(key: &str) {
        WS_TERMINAL_FAILURES_TOTAL.with_label_values(&[key]).inc();
    }

    pub fn event(kind: &str) {
        WS_EVENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn ticker_price(symbol: &str, price: f64) {
        TICKER_LAST_PRICE.with_label_values(&[symbol]).set(price);
    }

    /// Render the default registry in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
