//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → rotation loop leaves its select! → grace-close tasks exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller runs pool shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast: one trigger, many listeners
//! - Background loops never exit on their own; only a trigger stops them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
