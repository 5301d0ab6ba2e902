//! Mock Binance-style WebSocket server for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Record the requested stream path of every connection
//! - Push a fixed set of frames to each new connection
//! - Drop connections abruptly to provoke reconnects
//! - Record close codes sent by the client

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct ServerState {
    frames: Mutex<Vec<String>>,
    drop_remaining: AtomicU32,
    connections: AtomicU32,
    paths: Mutex<Vec<String>>,
    close_codes: Mutex<Vec<u16>>,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    state: Arc<ServerState>,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, state_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            state,
        }
    }

    /// Base URL to use as `binance_ws_url`.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Frames pushed to every new connection right after the handshake.
    pub fn set_frames(&self, frames: Vec<String>) {
        *self.state.frames.lock() = frames;
    }

    /// Drop the next `n` connections without a close frame after sending frames.
    pub fn drop_next_connections(&self, n: u32) {
        self.state.drop_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of completed handshakes.
    pub fn connection_count(&self) -> u32 {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Path and query requested by each connection, in order.
    pub fn requested_paths(&self) -> Vec<String> {
        self.state.paths.lock().clone()
    }

    /// Close codes received from the client.
    pub fn close_codes(&self) -> Vec<u16> {
        self.state.close_codes.lock().clone()
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    let paths_state = state.clone();
    let record_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let path = req
            .uri()
            .path_and_query()
            .map(|p| p.to_string())
            .unwrap_or_default();
        paths_state.paths.lock().push(path);
        Ok(resp)
    };

    let ws_stream = match accept_hdr_async(stream, record_path).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    let frames = state.frames.lock().clone();
    for frame in frames {
        if write.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    let drop_this = state
        .drop_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if drop_this {
        // Dropping both halves closes the TCP stream without a close frame
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(frame)) => {
                let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                state.close_codes.lock().push(code);
                break;
            }
            Err(_) => break,
            _ => {}
        }
    }
}

/// Binance 24h ticker payload.
pub fn ticker_frame(symbol: &str, price: &str, event_ms: i64) -> serde_json::Value {
    serde_json::json!({
        "e": "24hrTicker",
        "E": event_ms,
        "s": symbol,
        "p": "1.5",
        "P": "0.25",
        "c": price,
        "h": price,
        "l": price,
        "v": "100"
    })
}

/// Ticker payload wrapped in the combined-stream envelope.
pub fn combined_frame(symbol: &str, price: &str, event_ms: i64) -> serde_json::Value {
    serde_json::json!({
        "stream": format!("{}@ticker", symbol.to_ascii_lowercase()),
        "data": ticker_frame(symbol, price, event_ms)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
