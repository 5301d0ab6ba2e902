//! ChatClient against a local one-shot HTTP responder.

use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tradedesk_llm::{ChatClient, ChatClientConfig, ChatMessage, LlmError, Provider};
use tradedesk_store::{KeyValueStore, MemoryStore};

/// Serve exactly one request with `status` and `body`; resolves to the raw request.
async fn one_shot_server(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];

        // Headers, then Content-Length bytes of body
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            request.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).to_string()
    });

    (format!("http://{addr}"), handle)
}

fn client(store: MemoryStore, base: &str) -> ChatClient {
    let config = ChatClientConfig {
        openai_url: format!("{base}/v1/chat/completions"),
        anthropic_url: format!("{base}/v1/messages"),
        ..Default::default()
    };
    ChatClient::new(Arc::new(store), config).unwrap()
}

#[tokio::test]
async fn test_openai_success_sends_bearer_token() {
    let reply = json!({
        "choices": [{ "message": { "role": "assistant", "content": "BTC is up 2%." } }]
    });
    let (base, server) = one_shot_server("200 OK", reply.to_string()).await;

    let store = MemoryStore::new();
    store.set("api_keys.openai", json!("sk-test-123")).unwrap();
    let client = client(store, &base);

    let text = client
        .complete(
            Provider::OpenAi,
            &[ChatMessage::system("be brief"), ChatMessage::user("BTC?")],
        )
        .await
        .unwrap();
    assert_eq!(text, "BTC is up 2%.");

    let request = server.await.unwrap();
    let lower = request.to_ascii_lowercase();
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(lower.contains("authorization: bearer sk-test-123"));
    assert!(request.contains("\"role\":\"system\""));
}

#[tokio::test]
async fn test_anthropic_success_uses_api_key_header() {
    let reply = json!({ "content": [{ "type": "text", "text": "Quiet session." }] });
    let (base, server) = one_shot_server("200 OK", reply.to_string()).await;

    let store = MemoryStore::new();
    store.set("api_keys.anthropic", json!("ak-test")).unwrap();
    let client = client(store, &base);

    let text = client
        .complete(
            Provider::Anthropic,
            &[ChatMessage::system("be brief"), ChatMessage::user("Market?")],
        )
        .await
        .unwrap();
    assert_eq!(text, "Quiet session.");

    let request = server.await.unwrap();
    let lower = request.to_ascii_lowercase();
    assert!(request.starts_with("POST /v1/messages"));
    assert!(lower.contains("x-api-key: ak-test"));
    assert!(lower.contains("anthropic-version: 2023-06-01"));
    assert!(request.contains("\"system\":\"be brief\""));
}

#[tokio::test]
async fn test_unauthorized_maps_to_upstream_error() {
    let body = json!({ "error": { "message": "Incorrect API key provided" } });
    let (base, server) = one_shot_server("401 Unauthorized", body.to_string()).await;

    let store = MemoryStore::new();
    store.set("api_keys.openai", json!("sk-bad")).unwrap();
    let client = client(store, &base);

    let err = client
        .complete(Provider::OpenAi, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    match &err {
        LlmError::Upstream {
            provider,
            status,
            message,
        } => {
            assert_eq!(*provider, Provider::OpenAi);
            assert_eq!(*status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert!(err.is_auth_error());
    server.await.unwrap();
}

#[tokio::test]
async fn test_non_json_error_body_is_passed_through() {
    let (base, server) = one_shot_server("502 Bad Gateway", "upstream down".to_string()).await;

    let store = MemoryStore::new();
    store.set("api_keys.openai", json!("sk-test")).unwrap();
    let client = client(store, &base);

    let err = client
        .complete(Provider::OpenAi, &[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LlmError::Upstream { status: 502, ref message, .. } if message == "upstream down"
    ));
    assert!(!err.is_auth_error());
    server.await.unwrap();
}
