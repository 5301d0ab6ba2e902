//! Chat completion client for the assistant panel.
//!
//! API keys are read from the settings store on every call and never
//! leave this crate except as request headers.

pub mod client;
pub mod error;
pub mod provider;
pub mod request;

pub use client::{ChatClient, ChatClientConfig};
pub use error::{LlmError, LlmResult};
pub use provider::{ChatMessage, ChatRole, Provider};
pub use request::{build_request_body, extract_error_message, extract_text};
