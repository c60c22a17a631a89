//! Rotating connection pool.
//!
//! # Data Flow
//! ```text
//! get_connection():
//!     → state.rs (auto-initialize when Uninitialized or Closed)
//!     → manager.rs (probe the active handle, lock-free read)
//!     → manager.rs emergency rotation (ring lock; next healthy member or a new one)
//!
//! rotation task (every rotation_interval):
//!     → ring.rs (advance cursor, probe candidate, replace if unhealthy)
//!     → manager.rs (close the previous active handle after grace_delay)
//!     → stats.rs (timing and counters)
//! ```

pub mod connection;
pub mod error;
pub mod manager;
mod ring;
pub mod state;
pub mod stats;

pub use connection::{ConnectionFactory, ConnectionHandle, ConnectionId};
pub use error::PoolError;
pub use manager::ConnectionPool;
pub use state::PoolState;
pub use stats::PoolStats;
