//! LLM client error types.

use crate::provider::Provider;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No API key configured for {0}")]
    MissingApiKey(Provider),

    #[error("{provider} returned HTTP {status}: {message}")]
    Upstream {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Authentication rejected by the provider.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::MissingApiKey(_))
            || matches!(self, Self::Upstream { status, .. } if *status == 401 || *status == 403)
    }
}

pub type LlmResult<T> = Result<T, LlmError>;
