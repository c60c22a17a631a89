//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller wants to reach a dependency:
//!     → registry.rs (get_or_create breaker for the dependency name)
//!     → circuit_breaker.rs (reject fast if open, else run the operation)
//!     → error.rs (classify the failure; excluded kinds are not counted)
//!     → backoff.rs (grow the recovery timeout on every open transition)
//! ```
//!
//! # Design Decisions
//! - Breakers are reactive: no background task, all work happens inside `run`
//! - The registry is an owned value, never process-global state
//! - Retry policy stays with the caller; the breaker only gates

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod registry;

pub use circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitState, StateChange, StateListener};
pub use error::{BreakerError, Classify, ErrorKind};
pub use registry::CircuitBreakerRegistry;
