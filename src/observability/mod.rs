//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers and pools produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (breaker, state, duration) on every event
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - Durations in status snapshots serialize as fractional seconds

pub mod logging;
pub mod metrics;

use std::time::Duration;
use serde::Serializer;

/// Serialize a `Duration` as fractional seconds.
pub fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
