//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the resilience layer.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::resilience::error::ErrorKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Default breaker settings for dependencies without an override.
    pub breaker: CircuitBreakerConfig,

    /// Per-dependency breaker overrides, keyed by dependency name.
    pub breakers: BTreeMap<String, CircuitBreakerConfig>,

    /// Connection pool and rotation settings.
    pub pool: PoolConfig,

    /// WebSocket transport settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ResilienceConfig {
    /// Breaker config for a dependency, falling back to the default section.
    pub fn breaker_for(&self, name: &str) -> CircuitBreakerConfig {
        self.breakers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.breaker.clone())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures in Closed before opening.
    pub failure_threshold: u32,

    /// Successes in HalfOpen before closing.
    pub success_threshold: u32,

    /// Recovery timeout the breaker starts from (and resets to on close).
    pub initial_timeout_ms: u64,

    /// Upper bound for the recovery timeout.
    pub max_timeout_ms: u64,

    /// Growth factor applied on every open transition.
    pub backoff_multiplier: f64,

    /// Error kinds that pass through without being counted.
    pub excluded_errors: Vec<ErrorKind>,

    /// Capacity of the failure history ring.
    pub history_capacity: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            initial_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            backoff_multiplier: 2.0,
            excluded_errors: vec![ErrorKind::Cancelled],
            history_capacity: 100,
        }
    }
}

impl CircuitBreakerConfig {
    /// Profile for rate-limit rejections: opens fast, waits long.
    pub fn rate_limit() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            initial_timeout_ms: 60_000,
            max_timeout_ms: 600_000,
            ..Self::default()
        }
    }

    /// Profile for network errors: tolerant to open, strict to close.
    pub fn connection() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            initial_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            ..Self::default()
        }
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Whether failures of this kind are ignored by the breaker.
    pub fn is_excluded(&self, kind: ErrorKind) -> bool {
        self.excluded_errors.contains(&kind)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of warm connections to keep.
    pub size: usize,

    /// Time between predictive rotations.
    pub rotation_interval_ms: u64,

    /// The remote's forced-disconnect window; rotation must beat it.
    pub forced_disconnect_ms: u64,

    /// Delay before closing a rotated-out connection.
    pub grace_delay_ms: u64,

    /// Delay before retrying a failed rotation.
    pub retry_delay_ms: u64,

    /// Upper bound for a single health probe.
    pub probe_timeout_ms: u64,

    /// Upper bound for a single factory call.
    pub connect_timeout_ms: u64,

    /// How long shutdown waits for an in-flight rotation.
    pub shutdown_timeout_ms: u64,

    /// Create a fresh ring member after a rotated-out connection is closed.
    pub replenish_retired: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 3,
            rotation_interval_ms: 25_000,
            forced_disconnect_ms: 30_000,
            grace_delay_ms: 2_000,
            retry_delay_ms: 5_000,
            probe_timeout_ms: 2_000,
            connect_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            replenish_retired: false,
        }
    }
}

impl PoolConfig {
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_millis(self.rotation_interval_ms)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Stream endpoint (ws:// or wss://).
    pub url: String,

    /// Send a ping frame as part of each health probe.
    pub ping_on_probe: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9001/ws".to_string(),
            ping_on_probe: true,
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty for development, JSON for log shipping.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.excluded_errors, vec![ErrorKind::Cancelled]);
        assert_eq!(config.pool.rotation_interval(), Duration::from_secs(25));
        assert!(config.pool.rotation_interval_ms < config.pool.forced_disconnect_ms);
    }

    #[test]
    fn test_breaker_override_lookup() {
        let mut config = ResilienceConfig::default();
        config.breakers.insert("orders".into(), CircuitBreakerConfig::rate_limit());

        assert_eq!(config.breaker_for("orders").failure_threshold, 3);
        assert_eq!(config.breaker_for("balances").failure_threshold, 5);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ResilienceConfig = toml::from_str(
            r#"
            [breaker]
            failure_threshold = 2
            excluded_errors = ["cancelled", "auth"]

            [pool]
            size = 2

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.breaker.success_threshold, 2);
        assert!(config.breaker.is_excluded(ErrorKind::Auth));
        assert_eq!(config.pool.size, 2);
        assert_eq!(config.pool.grace_delay_ms, 2_000);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
