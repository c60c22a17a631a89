//! Pool statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use serde::Serialize;

use crate::observability::serialize_secs;
use crate::pool::state::PoolState;

/// Snapshot returned by `ConnectionPool::get_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub state: PoolState,
    /// Current number of ring members.
    pub pool_size: usize,
    /// Connections created by the factory over the pool's lifetime.
    pub total_connections: u64,
    pub successful_rotations: u64,
    pub failed_rotations: u64,
    pub emergency_rotations: u64,
    #[serde(serialize_with = "serialize_secs")]
    pub last_rotation_time: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub average_rotation_time: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub next_rotation_in: Duration,
}

#[derive(Debug, Default)]
struct RotationTiming {
    last: Duration,
    average: Duration,
}

/// Counters updated by the pool as it works.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    total_connections: AtomicU64,
    successful_rotations: AtomicU64,
    failed_rotations: AtomicU64,
    emergency_rotations: AtomicU64,
    timing: Mutex<RotationTiming>,
}

impl PoolCounters {
    pub fn connection_created(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rotation_failed(&self) {
        self.failed_rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emergency_rotation(&self) {
        self.emergency_rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful scheduled rotation and fold its duration into the running mean.
    pub fn rotation_succeeded(&self, duration: Duration) {
        let n = self.successful_rotations.fetch_add(1, Ordering::Relaxed) + 1;
        let mut timing = self.timing.lock().unwrap_or_else(PoisonError::into_inner);
        timing.last = duration;
        let previous = timing.average.as_secs_f64();
        let mean = previous + (duration.as_secs_f64() - previous) / n as f64;
        timing.average = Duration::from_secs_f64(mean.max(0.0));
    }

    pub fn snapshot(&self, state: PoolState, pool_size: usize, next_rotation_in: Duration) -> PoolStats {
        let timing = self.timing.lock().unwrap_or_else(PoisonError::into_inner);
        PoolStats {
            state,
            pool_size,
            total_connections: self.total_connections.load(Ordering::Relaxed),
            successful_rotations: self.successful_rotations.load(Ordering::Relaxed),
            failed_rotations: self.failed_rotations.load(Ordering::Relaxed),
            emergency_rotations: self.emergency_rotations.load(Ordering::Relaxed),
            last_rotation_time: timing.last,
            average_rotation_time: timing.average,
            next_rotation_in,
        }
    }
}
