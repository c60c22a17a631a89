//! Resilience layer for exchange WebSocket clients.
//!
//! Circuit breakers gate calls to an unreliable dependency; the connection pool keeps
//! a ring of pre-established connections and rotates through them ahead of the
//! exchange's forced disconnect window.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod transport;

pub use config::schema::ResilienceConfig;
pub use health::{HealthProbe, SyncProbe};
pub use lifecycle::Shutdown;
pub use pool::{ConnectionFactory, ConnectionHandle, ConnectionId, ConnectionPool, PoolError, PoolState, PoolStats};
pub use resilience::{
    BreakerError, BreakerStatus, CircuitBreaker, CircuitBreakerRegistry, CircuitState, Classify, ErrorKind,
    StateChange, StateListener,
};
pub use transport::{ConnectorError, PingProbe, WsConnection, WsConnector};
