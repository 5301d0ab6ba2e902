//! Symbol routing and Binance stream addressing.
//!
//! Crypto pairs are streamed from Binance over WebSocket; everything else is
//! served by Yahoo Finance polling and never gets a socket.

use crate::error::{FeedError, FeedResult};
use serde::Serialize;
use std::fmt;

/// Quote assets that mark a symbol as a Binance crypto pair.
pub const CRYPTO_QUOTE_SUFFIXES: &[&str] = &["USDT", "BUSD", "USDC", "BTC", "ETH", "BNB"];

/// Prefix of keys that multiplex several symbols over one combined stream.
const MULTI_KEY_PREFIX: &str = "multi:";

/// Upstream that serves a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Binance,
    Yahoo,
}

impl DataSource {
    /// Whether this source is streamed over WebSocket.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Binance)
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Yahoo => write!(f, "yahoo"),
        }
    }
}

/// Route a symbol to its upstream.
///
/// A symbol is a crypto pair when it ends with a known quote asset and has a
/// non-empty base in front of it ("BTC" alone is not a pair).
pub fn route_symbol(symbol: &str) -> DataSource {
    let symbol = symbol.trim().to_ascii_uppercase();
    let is_pair = CRYPTO_QUOTE_SUFFIXES
        .iter()
        .any(|quote| symbol.len() > quote.len() && symbol.ends_with(quote));
    if is_pair {
        DataSource::Binance
    } else {
        DataSource::Yahoo
    }
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// Single-symbol 24h ticker stream: `{base}/ws/{symbol}@ticker`.
pub fn ticker_stream_url(base: &str, symbol: &str) -> String {
    format!(
        "{}/ws/{}@ticker",
        trim_base(base),
        symbol.trim().to_ascii_lowercase()
    )
}

/// Combined ticker stream for several symbols over one socket.
///
/// Frames arrive wrapped as `{"stream": "...", "data": {...}}`.
pub fn combined_stream_url<S: AsRef<str>>(base: &str, symbols: &[S]) -> FeedResult<String> {
    if symbols.is_empty() {
        return Err(FeedError::EmptySymbolList);
    }
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@ticker", s.as_ref().trim().to_ascii_lowercase()))
        .collect();
    Ok(format!(
        "{}/stream?streams={}",
        trim_base(base),
        streams.join("/")
    ))
}

/// Subscription key for a single-symbol stream.
pub fn subscription_key(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Subscription key for a combined stream: `multi:A,B`.
pub fn combined_subscription_key<S: AsRef<str>>(symbols: &[S]) -> String {
    let joined: Vec<String> = symbols
        .iter()
        .map(|s| s.as_ref().trim().to_ascii_uppercase())
        .collect();
    format!("{MULTI_KEY_PREFIX}{}", joined.join(","))
}

/// Symbols carried by a subscription key.
pub fn symbols_for_key(key: &str) -> Vec<String> {
    match key.strip_prefix(MULTI_KEY_PREFIX) {
        Some(list) => list
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => vec![key.to_string()],
    }
}
