//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! get_connection() / rotation tick
//!     → probe.rs (probe_with_timeout around the injected HealthProbe)
//!     → healthy: promote or keep the handle
//!     → unhealthy or timed out: replace the handle
//! ```
//!
//! # Design Decisions
//! - Probes are injected capabilities, not introspection of the handle
//! - A probe that does not answer in time is treated as unhealthy

pub mod probe;

pub use probe::{probe_with_timeout, HealthProbe, SyncProbe};
