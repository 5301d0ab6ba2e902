//! Prometheus metrics and structured logging for tradedesk.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus gauges and counters for connection health and traffic

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
