//! Transport abstraction for upstream sockets.
//!
//! The connection manager only talks to [`Connector`] / [`Transport`], so the
//! production tungstenite socket, the metering decorator and test doubles are
//! interchangeable.

use crate::error::{WsError, WsResult};
use crate::monitor::TrafficMeter;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Standard "normal closure" close code.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame carried no status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    /// Terminal: no further events follow.
    Closed { code: u16, reason: String },
}

/// One open upstream socket.
pub trait Transport: Send {
    /// Wait for the next inbound event. Must be cancel-safe.
    fn recv(&mut self) -> BoxFuture<'_, TransportEvent>;

    /// Request closure with the given code.
    fn close(&mut self, code: u16, reason: &str) -> BoxFuture<'_, WsResult<()>>;
}

/// Factory for transports. Resolving `connect` successfully is the "open" event.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Box<dyn Transport>>>;
}

/// Arc wrapper for Connector trait objects.
pub type DynConnector = Arc<dyn Connector>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    /// Disable Nagle's algorithm on the TCP socket.
    pub disable_nagle: bool,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self {
            disable_nagle: true,
        }
    }
}

impl Connector for TungsteniteConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Box<dyn Transport>>> {
        Box::pin(async move {
            debug!(url, "Opening WebSocket");
            let (stream, _response) =
                connect_async_tls_with_config(url, None, self.disable_nagle, None)
                    .await
                    .map_err(|e| match e {
                        tungstenite::Error::Url(url_err) => WsError::InvalidUrl(url_err.to_string()),
                        other => WsError::ConnectionFailed(other.to_string()),
                    })?;
            Ok(Box::new(TungsteniteTransport { stream }) as Box<dyn Transport>)
        })
    }
}

struct TungsteniteTransport {
    stream: WsStream,
}

impl Transport for TungsteniteTransport {
    fn recv(&mut self) -> BoxFuture<'_, TransportEvent> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => return TransportEvent::Text(text),
                    Some(Ok(Message::Binary(data))) => return TransportEvent::Binary(data),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = self.stream.send(Message::Pong(data)).await {
                            warn!(?e, "Failed to answer ping");
                            return TransportEvent::Closed {
                                code: ABNORMAL_CLOSURE,
                                reason: e.to_string(),
                            };
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        return TransportEvent::Closed { code, reason };
                    }
                    Some(Err(e)) => {
                        return TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        return TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            }
        })
    }

    fn close(&mut self, code: u16, reason: &str) -> BoxFuture<'_, WsResult<()>> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };
        Box::pin(async move {
            match self.stream.close(Some(frame)).await {
                Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Decorator that counts inbound frames and bytes of every transport it opens.
pub struct MeteredConnector {
    inner: DynConnector,
    meter: Arc<TrafficMeter>,
}

impl MeteredConnector {
    pub fn new(inner: DynConnector, meter: Arc<TrafficMeter>) -> Self {
        Self { inner, meter }
    }

    pub fn meter(&self) -> &Arc<TrafficMeter> {
        &self.meter
    }
}

impl Connector for MeteredConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Box<dyn Transport>>> {
        Box::pin(async move {
            let inner = self.inner.connect(url).await?;
            Ok(Box::new(MeteredTransport {
                inner,
                meter: self.meter.clone(),
            }) as Box<dyn Transport>)
        })
    }
}

struct MeteredTransport {
    inner: Box<dyn Transport>,
    meter: Arc<TrafficMeter>,
}

impl Transport for MeteredTransport {
    fn recv(&mut self) -> BoxFuture<'_, TransportEvent> {
        Box::pin(async move {
            let event = self.inner.recv().await;
            match &event {
                TransportEvent::Text(text) => self.meter.record_frame(text.len()),
                TransportEvent::Binary(data) => self.meter.record_frame(data.len()),
                TransportEvent::Closed { .. } => {}
            }
            event
        })
    }

    fn close(&mut self, code: u16, reason: &str) -> BoxFuture<'_, WsResult<()>> {
        self.inner.close(code, reason)
    }
}
