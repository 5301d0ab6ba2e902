//! tradedesk live market-data host.
//!
//! Wires the pieces together:
//! - Symbol routing and Binance ticker subscriptions
//! - One shared connection manager with lifecycle event handling
//! - Periodic health and performance reporting
//! - Settings store and assistant chat client

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, FeedPlan};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
