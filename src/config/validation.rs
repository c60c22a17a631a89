//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts ordered)
//! - Check the rotation cadence beats the forced-disconnect window
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{CircuitBreakerConfig, PoolConfig, ResilienceConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("breaker '{breaker}': {field} must be at least 1")]
    ZeroThreshold { breaker: String, field: &'static str },

    #[error("breaker '{breaker}': initial timeout {initial_ms}ms exceeds max timeout {max_ms}ms")]
    TimeoutOrder { breaker: String, initial_ms: u64, max_ms: u64 },

    #[error("breaker '{breaker}': backoff multiplier {multiplier} must be >= 1.0")]
    Multiplier { breaker: String, multiplier: f64 },

    #[error("pool size must be at least 1")]
    EmptyPool,

    #[error("rotation interval {rotation_ms}ms must be > 0 and below the forced disconnect window {window_ms}ms")]
    RotationInterval { rotation_ms: u64, window_ms: u64 },

    #[error("pool {field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("invalid transport url '{url}': {reason}")]
    TransportUrl { url: String, reason: String },
}

/// Validate a pool section.
pub fn validate_pool(config: &PoolConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_pool(config, &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate the whole configuration.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_breaker("default", &config.breaker, &mut errors);
    for (name, breaker) in &config.breakers {
        check_breaker(name, breaker, &mut errors);
    }
    check_pool(&config.pool, &mut errors);

    match Url::parse(&config.transport.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
        Ok(url) => errors.push(ValidationError::TransportUrl {
            url: config.transport.url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::TransportUrl {
            url: config.transport.url.clone(),
            reason: e.to_string(),
        }),
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_breaker(name: &str, config: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if config.failure_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold {
            breaker: name.to_string(),
            field: "failure_threshold",
        });
    }
    if config.success_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold {
            breaker: name.to_string(),
            field: "success_threshold",
        });
    }
    if config.history_capacity == 0 {
        errors.push(ValidationError::ZeroThreshold {
            breaker: name.to_string(),
            field: "history_capacity",
        });
    }
    if config.initial_timeout_ms > config.max_timeout_ms {
        errors.push(ValidationError::TimeoutOrder {
            breaker: name.to_string(),
            initial_ms: config.initial_timeout_ms,
            max_ms: config.max_timeout_ms,
        });
    }
    if !(config.backoff_multiplier >= 1.0 && config.backoff_multiplier.is_finite()) {
        errors.push(ValidationError::Multiplier {
            breaker: name.to_string(),
            multiplier: config.backoff_multiplier,
        });
    }
}

fn check_pool(config: &PoolConfig, errors: &mut Vec<ValidationError>) {
    if config.size == 0 {
        errors.push(ValidationError::EmptyPool);
    }
    if config.rotation_interval_ms == 0 || config.rotation_interval_ms >= config.forced_disconnect_ms {
        errors.push(ValidationError::RotationInterval {
            rotation_ms: config.rotation_interval_ms,
            window_ms: config.forced_disconnect_ms,
        });
    }
    for (field, value) in [
        ("retry_delay_ms", config.retry_delay_ms),
        ("probe_timeout_ms", config.probe_timeout_ms),
        ("connect_timeout_ms", config.connect_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }
}
