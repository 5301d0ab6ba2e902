//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tradedesk_ws::ConnectionConfig;

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Maximum consecutive reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for reconnection backoff (ms).
    pub reconnect_max_delay_ms: u64,
    /// Time a connection must stay open before its reconnect counter resets (ms).
    pub stable_open_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            max_reconnect_attempts: defaults.max_reconnect_attempts,
            reconnect_base_delay_ms: defaults.reconnect_base_delay_ms,
            reconnect_max_delay_ms: defaults.reconnect_max_delay_ms,
            stable_open_ms: defaults.stable_open_ms,
        }
    }
}

impl From<WsConfig> for ConnectionConfig {
    fn from(cfg: WsConfig) -> Self {
        Self {
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_base_delay_ms: cfg.reconnect_base_delay_ms,
            reconnect_max_delay_ms: cfg.reconnect_max_delay_ms,
            stable_open_ms: cfg.stable_open_ms,
            ..Default::default()
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Seconds between health/performance reports.
    pub report_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

/// Settings store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding user settings and API keys.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "data/settings.json".to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Binance streaming base URL (no trailing path).
    #[serde(default = "default_binance_ws_url")]
    pub binance_ws_url: String,
    /// Symbols to watch. A stored watchlist takes precedence.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Multiplex crypto symbols over one combined stream.
    #[serde(default)]
    pub combined: bool,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_binance_ws_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            binance_ws_url: default_binance_ws_url(),
            symbols: default_symbols(),
            combined: false,
            websocket: WsConfig::default(),
            telemetry: TelemetryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the connection manager cannot work with.
    pub fn validate(&self) -> AppResult<()> {
        if !self.binance_ws_url.starts_with("ws://") && !self.binance_ws_url.starts_with("wss://")
        {
            return Err(AppError::Config(format!(
                "binance_ws_url must be a ws:// or wss:// URL, got {}",
                self.binance_ws_url
            )));
        }
        if self.websocket.reconnect_base_delay_ms == 0 {
            return Err(AppError::Config(
                "websocket.reconnect_base_delay_ms must be positive".to_string(),
            ));
        }
        if self.websocket.reconnect_max_delay_ms < self.websocket.reconnect_base_delay_ms {
            return Err(AppError::Config(
                "websocket.reconnect_max_delay_ms must be >= reconnect_base_delay_ms".to_string(),
            ));
        }
        if self.telemetry.report_interval_secs == 0 {
            return Err(AppError::Config(
                "telemetry.report_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
