//! HTTP chat completion client.

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChatMessage, Provider};
use crate::request::{build_request_body, extract_error_message, extract_text};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tradedesk_store::KeyValueStore;
use zeroize::Zeroizing;

/// Default timeout for chat requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Longest upstream body echoed into an error.
const MAX_ERROR_BODY: usize = 512;

/// Endpoint and model overrides.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub openai_url: String,
    pub anthropic_url: String,
    pub openai_model: String,
    pub anthropic_model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            openai_url: Provider::OpenAi.default_endpoint().to_string(),
            anthropic_url: Provider::Anthropic.default_endpoint().to_string(),
            openai_model: Provider::OpenAi.default_model().to_string(),
            anthropic_model: Provider::Anthropic.default_model().to_string(),
            max_tokens: 1024,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ChatClientConfig {
    fn endpoint(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.openai_url,
            Provider::Anthropic => &self.anthropic_url,
        }
    }

    fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::OpenAi => &self.openai_model,
            Provider::Anthropic => &self.anthropic_model,
        }
    }
}

/// Chat client that resolves API keys from the settings store.
pub struct ChatClient {
    client: Client,
    store: Arc<dyn KeyValueStore>,
    config: ChatClientConfig,
}

impl ChatClient {
    pub fn new(store: Arc<dyn KeyValueStore>, config: ChatClientConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            store,
            config,
        })
    }

    /// Look up the provider's API key.
    ///
    /// Absent, non-string and blank values all count as missing.
    fn resolve_api_key(&self, provider: Provider) -> LlmResult<Zeroizing<String>> {
        match self.store.get(provider.api_key_name()) {
            Some(Value::String(key)) if !key.trim().is_empty() => {
                Ok(Zeroizing::new(key.trim().to_string()))
            }
            _ => Err(LlmError::MissingApiKey(provider)),
        }
    }

    /// Whether a usable API key is stored for `provider`.
    pub fn has_api_key(&self, provider: Provider) -> bool {
        self.resolve_api_key(provider).is_ok()
    }

    /// Send `messages` to `provider` and return the reply text.
    pub async fn complete(&self, provider: Provider, messages: &[ChatMessage]) -> LlmResult<String> {
        // No key, no request
        let api_key = self.resolve_api_key(provider)?;

        let url = self.config.endpoint(provider);
        let model = self.config.model(provider);
        let body = build_request_body(provider, model, messages, self.config.max_tokens);
        debug!(%provider, model, turns = messages.len(), "Sending chat request");

        let request = self.client.post(url).json(&body);
        let request = match provider {
            Provider::OpenAi => request.bearer_auth(api_key.as_str()),
            Provider::Anthropic => request
                .header("x-api-key", api_key.as_str())
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Http(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| extract_error_message(&v))
                .unwrap_or_else(|| truncate(&text, MAX_ERROR_BODY));
            warn!(%provider, status = status.as_u16(), %message, "Chat request rejected");
            return Err(LlmError::Upstream {
                provider,
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        let reply = extract_text(provider, &body)?;
        info!(%provider, chars = reply.len(), "Chat reply received");
        Ok(reply)
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tradedesk_store::MemoryStore;

    fn client_with(store: MemoryStore) -> ChatClient {
        let config = ChatClientConfig {
            // Nothing listens here; a request would fail with Http
            openai_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            anthropic_url: "http://127.0.0.1:9/v1/messages".to_string(),
            ..Default::default()
        };
        ChatClient::new(Arc::new(store), config).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_rejected_before_network() {
        let client = client_with(MemoryStore::new());
        let result = client
            .complete(Provider::OpenAi, &[ChatMessage::user("hi")])
            .await;
        assert!(matches!(result, Err(LlmError::MissingApiKey(Provider::OpenAi))));
    }

    #[tokio::test]
    async fn test_blank_key_counts_as_missing() {
        let store = MemoryStore::new();
        tradedesk_store::KeyValueStore::set(&store, "api_keys.anthropic", json!("   ")).unwrap();
        let client = client_with(store);
        assert!(!client.has_api_key(Provider::Anthropic));
        let result = client
            .complete(Provider::Anthropic, &[ChatMessage::user("hi")])
            .await;
        assert!(matches!(
            result,
            Err(LlmError::MissingApiKey(Provider::Anthropic))
        ));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
