//! Connection capabilities consumed by the pool.
//!
//! # Responsibilities
//! - Give every pooled handle a unique, loggable identity
//! - Define how handles are created (factory) and closed (handle)

use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;

use crate::transport::ConnectorError;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live transport connection owned by the pool.
#[async_trait]
pub trait ConnectionHandle: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    /// Disconnect. Calling it on an already closed handle must succeed or fail harmlessly.
    async fn close(&self) -> Result<(), ConnectorError>;
}

/// Opens new connections. Must not retry internally; retries are the pool's job.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: ConnectionHandle;

    async fn create(&self) -> Result<Self::Connection, ConnectorError>;
}
