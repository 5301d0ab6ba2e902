//! Latest ticker per symbol.

use crate::error::FeedResult;
use crate::ticker::TickerUpdate;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Board counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BoardStats {
    pub applied: u64,
    /// Frames older than the stored ticker for the same symbol.
    pub stale: u64,
    pub rejected: u64,
}

/// Concurrent store of the newest ticker for every symbol seen.
///
/// Written from connection callbacks, read by the reporting loop.
#[derive(Debug, Default)]
pub struct TickerBoard {
    tickers: DashMap<String, TickerUpdate>,
    applied: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
}

impl TickerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a frame and keep it if it is newer than what the board holds.
    ///
    /// Returns the parsed update even when it was stale.
    pub fn apply(&self, frame: &Value) -> FeedResult<TickerUpdate> {
        let update = match TickerUpdate::from_value(frame) {
            Ok(update) => update,
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Ticker frame rejected");
                return Err(e);
            }
        };

        let mut entry = self
            .tickers
            .entry(update.symbol.clone())
            .or_insert_with(|| update.clone());
        if update.event_time < entry.event_time {
            self.stale.fetch_add(1, Ordering::Relaxed);
            trace!(symbol = %update.symbol, "Stale ticker ignored");
        } else {
            *entry = update.clone();
            self.applied.fetch_add(1, Ordering::Relaxed);
        }

        Ok(update)
    }

    pub fn get(&self, symbol: &str) -> Option<TickerUpdate> {
        self.tickers.get(symbol).map(|t| t.clone())
    }

    /// Symbols on the board, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.tickers.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn stats(&self) -> BoardStats {
        BoardStats {
            applied: self.applied.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn frame(symbol: &str, price: &str, time: i64) -> Value {
        json!({
            "e": "24hrTicker", "E": time, "s": symbol,
            "p": "0", "P": "0", "c": price, "h": price, "l": price, "v": "1"
        })
    }

    #[test]
    fn test_board_keeps_newest() {
        let board = TickerBoard::new();
        board.apply(&frame("BTCUSDT", "100", 2000)).unwrap();
        board.apply(&frame("BTCUSDT", "90", 1000)).unwrap();
        board.apply(&frame("ETHUSDT", "5", 1500)).unwrap();

        assert_eq!(board.get("BTCUSDT").unwrap().last_price, dec!(100));
        assert_eq!(board.symbols(), vec!["BTCUSDT", "ETHUSDT"]);

        let stats = board.stats();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.stale, 1);
    }

    #[test]
    fn test_board_counts_rejections() {
        let board = TickerBoard::new();
        assert!(board.apply(&json!({"ping": 1})).is_err());
        assert!(board.is_empty());
        assert_eq!(board.stats().rejected, 1);
    }
}
