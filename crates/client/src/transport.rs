//! Push-channel transports.
//!
//! A [`Connector`] opens one [`PushChannel`] per connection attempt. The
//! connection manager owns reconnection; transports only move frames.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::wire::Frame;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("frame codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("not connected")]
    NotConnected,
    #[error("channel closed")]
    Closed,
}

/// One live bidirectional link.
#[async_trait]
pub trait PushChannel: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Next inbound frame; `None` once the link is closed.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, TransportError>;
}

/// JSON-over-WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        tracing::debug!(url = %self.url, "opening push channel");
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WebSocketChannel { ws }))
    }
}

struct WebSocketChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let text = serde_json::to_string(&frame)?;
        self.ws
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.ws.next().await? {
                Ok(WsMessage::Text(text)) => {
                    return Some(serde_json::from_str::<Frame>(text.as_str()).map_err(TransportError::from));
                }
                Ok(WsMessage::Binary(bytes)) => {
                    return Some(serde_json::from_slice::<Frame>(&bytes).map_err(TransportError::from));
                }
                Ok(WsMessage::Close(_)) => return None,
                // Pings are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }
}

#[derive(Default)]
struct MemoryShared {
    attempts: AtomicUsize,
    refusing: AtomicBool,
    link: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    sent: Mutex<Vec<Frame>>,
}

/// In-process transport: the holder plays the server side.
///
/// Frames pushed with [`MemoryConnector::push`] arrive on the current link;
/// frames the client sends are recorded and readable with
/// [`MemoryConnector::sent`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<MemoryShared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `frame` to the connected client. Returns `false` when no link
    /// is up.
    pub fn push(&self, frame: Frame) -> bool {
        let link = self.shared.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.as_ref().is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Close the current link as if the server went away.
    pub fn drop_link(&self) {
        self.shared
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Make subsequent connection attempts fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn is_linked(&self) -> bool {
        self.shared
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.shared.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_sent(&self) {
        self.shared.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        // Replacing the sender closes any previous link.
        *self.shared.link.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(Box::new(MemoryChannel {
            inbound: rx,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<MemoryShared>,
}

#[async_trait]
impl PushChannel for MemoryChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.shared
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }
}
