//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Symbol list is empty")]
    EmptySymbolList,

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
