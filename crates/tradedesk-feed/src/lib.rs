//! Market data feed plumbing.
//!
//! Decides which upstream serves a symbol, builds Binance stream URLs and
//! subscription keys, and turns ticker frames into typed updates.

pub mod board;
pub mod error;
pub mod routing;
pub mod ticker;

pub use board::{BoardStats, TickerBoard};
pub use error::{FeedError, FeedResult};
pub use routing::{
    combined_stream_url, combined_subscription_key, route_symbol, subscription_key,
    symbols_for_key, ticker_stream_url, DataSource, CRYPTO_QUOTE_SUFFIXES,
};
pub use ticker::TickerUpdate;
