//! Binance 24h rolling ticker parsing.
//!
//! Binance sends numeric values as strings; they are parsed into `Decimal`
//! to avoid float rounding on prices.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// One 24h ticker update for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerUpdate {
    pub symbol: String,
    pub last_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Base asset volume over the window.
    pub volume: Decimal,
    pub event_time: DateTime<Utc>,
}

impl TickerUpdate {
    /// Parse a ticker frame.
    ///
    /// Accepts both the raw single-stream payload and the combined-stream
    /// envelope `{"stream": "...", "data": {...}}`.
    pub fn from_value(value: &Value) -> FeedResult<Self> {
        let data = match (value.get("stream"), value.get("data")) {
            (Some(_), Some(data)) => data,
            _ => value,
        };

        if let Some(kind) = data.get("e").and_then(Value::as_str) {
            if kind != "24hrTicker" {
                return Err(FeedError::InvalidData(format!(
                    "unexpected event type: {kind}"
                )));
            }
        }

        let symbol = data
            .get("s")
            .and_then(Value::as_str)
            .ok_or_else(|| FeedError::InvalidData("missing symbol".to_string()))?
            .to_string();

        let event_ms = data
            .get("E")
            .and_then(Value::as_i64)
            .ok_or_else(|| FeedError::InvalidData("missing event time".to_string()))?;
        let event_time = DateTime::from_timestamp_millis(event_ms)
            .ok_or_else(|| FeedError::InvalidData(format!("event time out of range: {event_ms}")))?;

        Ok(Self {
            last_price: decimal_field(data, "c")?,
            price_change: decimal_field(data, "p")?,
            price_change_percent: decimal_field(data, "P")?,
            high: decimal_field(data, "h")?,
            low: decimal_field(data, "l")?,
            volume: decimal_field(data, "v")?,
            symbol,
            event_time,
        })
    }

    /// Price moved up over the window.
    pub fn is_up(&self) -> bool {
        self.price_change.is_sign_positive() && !self.price_change.is_zero()
    }
}

fn decimal_field(data: &Value, field: &str) -> FeedResult<Decimal> {
    match data.get(field) {
        Some(Value::String(s)) => Decimal::from_str(s)
            .map_err(|e| FeedError::InvalidData(format!("field {field}: {e}"))),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map_err(|e| FeedError::InvalidData(format!("field {field}: {e}"))),
        Some(other) => Err(FeedError::InvalidData(format!(
            "field {field}: expected decimal string, got {other}"
        ))),
        None => Err(FeedError::InvalidData(format!("missing field {field}"))),
    }
}
