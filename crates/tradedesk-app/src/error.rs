//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] tradedesk_feed::FeedError),

    #[error("Store error: {0}")]
    Store(#[from] tradedesk_store::StoreError),

    #[error("Assistant error: {0}")]
    Llm(#[from] tradedesk_llm::LlmError),
}

pub type AppResult<T> = Result<T, AppError>;
