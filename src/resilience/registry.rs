//! Named collection of circuit breakers.
//!
//! # Responsibilities
//! - Create one breaker per dependency on first use
//! - Aggregate health across every owned breaker
//! - Operator-triggered recovery of all breakers at once

use std::sync::Arc;
use dashmap::DashMap;

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitState, StateListener};

/// Owns every breaker of a client, keyed by dependency name.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    listener: Option<StateListener>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry using `default_config` for new breakers.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            listener: None,
        }
    }

    /// Attach a listener to every breaker created from now on.
    pub fn with_listener(mut self, listener: StateListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Return the breaker for `name`, creating it on first access.
    ///
    /// The config only applies when the breaker is created; later calls with a
    /// different config get the existing instance.
    pub fn get_or_create(&self, name: &str, config: Option<CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            let config = config.unwrap_or_else(|| self.default_config.clone());
            let mut breaker = CircuitBreaker::new(name, config);
            if let Some(listener) = &self.listener {
                breaker = breaker.with_listener(Arc::clone(listener));
            }
            tracing::info!(breaker = %name, "Created circuit breaker");
            Arc::new(breaker)
        });
        Arc::clone(entry.value())
    }

    /// Look up a breaker without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Percentage of breakers currently closed; 100 when there are none.
    pub fn health_score(&self) -> f64 {
        let total = self.breakers.len();
        if total == 0 {
            return 100.0;
        }
        let closed = self
            .breakers
            .iter()
            .filter(|r| r.value().state() == CircuitState::Closed)
            .count();
        closed as f64 / total as f64 * 100.0
    }

    /// Force every breaker back to Closed.
    pub fn reset_all(&self) {
        let breakers: Vec<_> = self.breakers.iter().map(|r| Arc::clone(r.value())).collect();
        for breaker in &breakers {
            breaker.reset();
        }
        tracing::info!(count = breakers.len(), "Reset all circuit breakers");
    }

    /// Status of every breaker, sorted by name.
    pub fn all_status(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<_> = self.breakers.iter().map(|r| r.value().get_status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("default_config", &self.default_config)
            .finish()
    }
}
