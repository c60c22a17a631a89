//! Connection health probing.
//!
//! # Responsibilities
//! - Define the probe capability the pool consumes
//! - Adapt synchronous checks (closures) to the async probe interface
//! - Bound every probe with a timeout so a hung remote cannot stall rotation

use std::marker::PhantomData;
use std::time::Duration;
use async_trait::async_trait;
use tokio::time;

/// Decides whether a connection is still usable.
///
/// Implementations return `false` for a merely unhealthy handle instead of failing.
#[async_trait]
pub trait HealthProbe<C: Send + Sync + 'static>: Send + Sync + 'static {
    async fn is_healthy(&self, connection: &C) -> bool;
}

/// Probe backed by a synchronous predicate.
pub struct SyncProbe<C, F> {
    check: F,
    _connection: PhantomData<fn(&C)>,
}

impl<C, F> SyncProbe<C, F>
where
    F: Fn(&C) -> bool,
{
    pub fn new(check: F) -> Self {
        Self {
            check,
            _connection: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F> HealthProbe<C> for SyncProbe<C, F>
where
    C: Send + Sync + 'static,
    F: Fn(&C) -> bool + Send + Sync + 'static,
{
    async fn is_healthy(&self, connection: &C) -> bool {
        (self.check)(connection)
    }
}

/// Run `probe` with an upper bound; a timeout counts as unhealthy.
pub async fn probe_with_timeout<C, P>(probe: &P, connection: &C, timeout: Duration) -> bool
where
    C: Send + Sync + 'static,
    P: HealthProbe<C> + ?Sized,
{
    match time::timeout(timeout, probe.is_healthy(connection)).await {
        Ok(healthy) => healthy,
        Err(_) => {
            tracing::warn!(?timeout, "Health probe timed out");
            false
        }
    }
}
