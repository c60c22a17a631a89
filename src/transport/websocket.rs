//! WebSocket connections for the pool.
//!
//! # Responsibilities
//! - Open client connections with `tokio-tungstenite`
//! - Expose send/receive on a shared handle (sink and stream locked separately)
//! - Report liveness for the pool's health probe

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::health::probe::HealthProbe;
use crate::pool::connection::{ConnectionFactory, ConnectionHandle, ConnectionId};
use crate::transport::error::ConnectorError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections to a single endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Only `ws` and `wss` URLs are accepted.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, ConnectorError> {
        let url = Url::parse(url).map_err(|e| ConnectorError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectorError::InvalidUrl(format!("{url}: scheme must be ws or wss")));
        }
        Ok(Self { url, connect_timeout })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConnectionFactory for WsConnector {
    type Connection = WsConnection;

    async fn create(&self) -> Result<WsConnection, ConnectorError> {
        let (stream, response) = time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ConnectorError::Timeout(self.connect_timeout))??;

        let connection = WsConnection::new(self.url.clone(), stream);
        tracing::debug!(
            connection = %connection.id(),
            url = %self.url,
            status = %response.status(),
            "WebSocket connected"
        );
        Ok(connection)
    }
}

/// A client WebSocket shared between the pool and its callers.
pub struct WsConnection {
    id: ConnectionId,
    url: Url,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: AtomicBool,
    created_at: Instant,
}

impl WsConnection {
    fn new(url: Url, stream: WsStream) -> Self {
        let (sink, stream) = stream.split();
        Self {
            id: ConnectionId::new(),
            url,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
            created_at: Instant::now(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub async fn send(&self, message: Message) -> Result<(), ConnectorError> {
        if self.is_closed() {
            return Err(ConnectorError::Closed);
        }
        let result = self.sink.lock().await.send(message).await;
        result.map_err(|e| {
            self.closed.store(true, Ordering::SeqCst);
            ConnectorError::from(e)
        })
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectorError> {
        self.send(Message::text(text.into())).await
    }

    pub async fn ping(&self) -> Result<(), ConnectorError> {
        self.send(Message::Ping(Vec::new().into())).await
    }

    /// Next data or control frame; `None` once the remote closed the socket.
    pub async fn recv(&self) -> Result<Option<Message>, ConnectorError> {
        if self.is_closed() {
            return Err(ConnectorError::Closed);
        }
        match self.stream.lock().await.next().await {
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(connection = %self.id, ?frame, "Remote closed WebSocket");
                self.closed.store(true, Ordering::SeqCst);
                Ok(None)
            }
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(e.into())
            }
            None => {
                self.closed.store(true, Ordering::SeqCst);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ConnectionHandle for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.sink.lock().await.close().await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                tracing::debug!(connection = %self.id, age = ?self.age(), "WebSocket closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Health probe for [`WsConnection`].
///
/// A closed socket is unhealthy. With `send_ping` set, the probe also writes a ping
/// frame and treats a write failure as unhealthy.
#[derive(Debug, Clone, Copy)]
pub struct PingProbe {
    send_ping: bool,
}

impl PingProbe {
    pub fn new(send_ping: bool) -> Self {
        Self { send_ping }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl HealthProbe<WsConnection> for PingProbe {
    async fn is_healthy(&self, connection: &WsConnection) -> bool {
        if connection.is_closed() {
            return false;
        }
        if !self.send_ping {
            return true;
        }
        match connection.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(connection = %connection.id(), error = %e, "Ping failed");
                false
            }
        }
    }
}
