//! Transport error definitions.

use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::resilience::error::{Classify, ErrorKind};

/// Errors raised while opening, using or closing a transport connection.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Operation did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// WebSocket protocol or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote rejected the call because of rate limiting.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Credentials were rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    #[error("invalid url '{0}'")]
    InvalidUrl(String),
}

impl Classify for ConnectorError {
    fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Timeout(_) => ErrorKind::Timeout,
            ConnectorError::Connect(_) | ConnectorError::Closed => ErrorKind::Connection,
            ConnectorError::WebSocket(e) => match e {
                tungstenite::Error::Http(response) if response.status().as_u16() == 429 => ErrorKind::RateLimited,
                tungstenite::Error::Http(response) if matches!(response.status().as_u16(), 401 | 403) => ErrorKind::Auth,
                tungstenite::Error::Http(response) if response.status().is_server_error() => ErrorKind::Server,
                tungstenite::Error::Io(io) => Classify::kind(io),
                _ => ErrorKind::Connection,
            },
            ConnectorError::Io(e) => Classify::kind(e),
            ConnectorError::RateLimited(_) => ErrorKind::RateLimited,
            ConnectorError::Auth(_) => ErrorKind::Auth,
            ConnectorError::Cancelled => ErrorKind::Cancelled,
            ConnectorError::InvalidUrl(_) => ErrorKind::Other,
        }
    }
}
