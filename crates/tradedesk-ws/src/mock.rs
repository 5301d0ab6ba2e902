//! Scriptable in-memory connector for tests.
//!
//! Every successful `connect` creates a transport whose inbound side is fed
//! through a [`MockTransportHandle`], looked up by URL.

use crate::error::{WsError, WsResult};
use crate::transport::{BoxFuture, Connector, Transport, TransportEvent, ABNORMAL_CLOSURE};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How new connections behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Open and wait for events pushed through the handle.
    Manual,
    /// Open, then report closure with this code on the first `recv`.
    CloseImmediately(u16),
    /// Fail the connect attempt.
    Refuse,
}

/// Test-side handle to one mock transport.
#[derive(Clone)]
pub struct MockTransportHandle {
    url: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl MockTransportHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(TransportEvent::Text(text.into()));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self.tx.send(TransportEvent::Binary(data));
    }

    /// Simulate the peer closing the socket.
    pub fn close_from_server(&self, code: u16) {
        let _ = self.tx.send(TransportEvent::Closed {
            code,
            reason: "server close".to_string(),
        });
    }

    /// Close code the client sent, if it closed this transport.
    pub fn closed_with(&self) -> Option<u16> {
        *self.closed_with.lock()
    }
}

/// Mock connector recording every transport it opens.
pub struct MockConnector {
    behavior: Mutex<MockBehavior>,
    attempts: AtomicU32,
    handles: Mutex<Vec<MockTransportHandle>>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            attempts: AtomicU32::new(0),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Total connect attempts, including refused ones.
    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Handles of all opened transports, oldest first.
    pub fn handles(&self) -> Vec<MockTransportHandle> {
        self.handles.lock().clone()
    }

    /// Most recent transport opened for `url`.
    pub fn handle(&self, url: &str) -> Option<MockTransportHandle> {
        self.handles
            .lock()
            .iter()
            .rev()
            .find(|h| h.url == url)
            .cloned()
    }

    /// Number of transports opened for `url`.
    pub fn opened_count(&self, url: &str) -> usize {
        self.handles.lock().iter().filter(|h| h.url == url).count()
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Box<dyn Transport>>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(WsError::InvalidUrl(url.to_string()));
            }

            let behavior = *self.behavior.lock();
            if behavior == MockBehavior::Refuse {
                return Err(WsError::ConnectionFailed("connection refused".to_string()));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let closed_with = Arc::new(Mutex::new(None));
            if let MockBehavior::CloseImmediately(code) = behavior {
                let _ = tx.send(TransportEvent::Closed {
                    code,
                    reason: "closed immediately".to_string(),
                });
            }

            self.handles.lock().push(MockTransportHandle {
                url: url.to_string(),
                tx,
                closed_with: closed_with.clone(),
            });

            Ok(Box::new(MockTransport { rx, closed_with }) as Box<dyn Transport>)
        })
    }
}

struct MockTransport {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl Transport for MockTransport {
    fn recv(&mut self) -> BoxFuture<'_, TransportEvent> {
        Box::pin(async move {
            self.rx.recv().await.unwrap_or(TransportEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: "handle dropped".to_string(),
            })
        })
    }

    fn close(&mut self, code: u16, _reason: &str) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            *self.closed_with.lock() = Some(code);
            self.rx.close();
            Ok(())
        })
    }
}
