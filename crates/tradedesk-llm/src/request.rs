//! Provider wire formats.
//!
//! OpenAI takes system prompts inline in `messages`; Anthropic wants them in
//! a top-level `system` field and only user/assistant turns in `messages`.

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChatMessage, ChatRole, Provider};
use serde_json::{json, Value};

/// Build the JSON request body for `provider`.
pub fn build_request_body(
    provider: Provider,
    model: &str,
    messages: &[ChatMessage],
    max_tokens: u32,
) -> Value {
    match provider {
        Provider::OpenAi => json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages,
        }),
        Provider::Anthropic => {
            let system: Vec<&str> = messages
                .iter()
                .filter(|m| m.role == ChatRole::System)
                .map(|m| m.content.as_str())
                .collect();
            let turns: Vec<&ChatMessage> = messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .collect();

            let mut body = json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": turns,
            });
            if !system.is_empty() {
                body["system"] = Value::String(system.join("\n\n"));
            }
            body
        }
    }
}

/// Pull the assistant's reply out of a successful response.
pub fn extract_text(provider: Provider, body: &Value) -> LlmResult<String> {
    match provider {
        Provider::OpenAi => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing choices[0].message.content".to_string())
            }),
        Provider::Anthropic => {
            let blocks = body
                .get("content")
                .and_then(Value::as_array)
                .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;
            let text: String = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if text.is_empty() {
                return Err(LlmError::InvalidResponse(
                    "no text blocks in content".to_string(),
                ));
            }
            Ok(text)
        }
    }
}

/// Provider error message from an error body, if it has one.
///
/// Both providers use `{"error": {"message": "..."}}`.
pub fn extract_error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}
