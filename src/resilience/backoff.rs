//! Exponential growth of the breaker recovery timeout.

use std::time::Duration;

/// Grow a recovery timeout by `multiplier`, capped at `max`.
pub fn next_timeout(current: Duration, multiplier: f64, max: Duration) -> Duration {
    if multiplier <= 1.0 || !multiplier.is_finite() {
        return current.min(max);
    }

    // Compare in f64 first; mul_f64 panics on overflow.
    let grown_secs = current.as_secs_f64() * multiplier;
    if grown_secs >= max.as_secs_f64() {
        return max;
    }
    current.mul_f64(multiplier).min(max)
}
