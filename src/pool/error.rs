//! Pool error definitions.

use thiserror::Error;

use crate::resilience::error::{Classify, ErrorKind};
use crate::transport::ConnectorError;

/// Errors surfaced by the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No healthy connection exists and a new one could not be created.
    #[error("connection pool exhausted: {source}")]
    Exhausted { source: ConnectorError },

    /// A scheduled rotation could not produce a new active connection.
    #[error("rotation failed: {0}")]
    Rotation(#[source] ConnectorError),

    #[error("connection pool is shutting down")]
    ShuttingDown,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl Classify for PoolError {
    fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Exhausted { source } => source.kind(),
            PoolError::Rotation(e) => e.kind(),
            PoolError::ShuttingDown => ErrorKind::Cancelled,
            PoolError::InvalidConfig(_) => ErrorKind::Other,
        }
    }
}
