//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half_open, 2=open, by breaker
//! - `circuit_breaker_rejections_total` (counter): calls refused while open
//! - `circuit_breaker_failures_total` (counter): counted failures, by kind
//! - `pool_rotations_total` (counter): rotations by kind and outcome
//! - `pool_rotation_duration_seconds` (histogram): time spent rotating
//! - `pool_connections_created_total` (counter): factory successes
//! - `pool_size` (gauge): current ring length
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder it is a no-op
//! - The Prometheus exporter is opt-in via config

use std::net::SocketAddr;
use std::time::Duration;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::error::ErrorKind;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_circuit_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("circuit_breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_circuit_rejection(breaker: &str) {
    metrics::counter!("circuit_breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_circuit_failure(breaker: &str, kind: ErrorKind) {
    metrics::counter!(
        "circuit_breaker_failures_total",
        "breaker" => breaker.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// `kind` is "scheduled" or "emergency".
pub fn record_rotation(kind: &'static str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("pool_rotations_total", "kind" => kind, "outcome" => outcome).increment(1);
    if success {
        metrics::histogram!("pool_rotation_duration_seconds", "kind" => kind).record(duration.as_secs_f64());
    }
}

pub fn record_connection_created() {
    metrics::counter!("pool_connections_created_total").increment(1);
}

pub fn record_pool_size(size: usize) {
    metrics::gauge!("pool_size").set(size as f64);
}
