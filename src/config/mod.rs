//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → sections handed to the breaker registry, the pool and the transport
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a breaker keeps the config it was built with
//! - All fields have defaults to allow minimal configs
//! - Durations are stored as integer milliseconds and exposed as `Duration` accessors
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::CircuitBreakerConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::PoolConfig;
pub use schema::ResilienceConfig;
pub use schema::TransportConfig;
