//! Rotating connection pool.
//!
//! # Responsibilities
//! - Keep a ring of N connections with one active member handed to callers
//! - Predictively rotate to the next member before the remote forces a disconnect
//! - Recover from an unhealthy active connection on the request path
//! - Close rotated-out connections after a grace delay, and everything on shutdown
//!
//! # Concurrency
//! The ring lock is the rotation critical section: predictive rotation, emergency
//! rotation and grace close all take it, so at most one of them mutates the ring at
//! a time. Readers never take it; the active handle is published through an
//! `ArcSwapOption` and read lock-free.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use arc_swap::ArcSwapOption;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::validation::validate_pool;
use crate::config::PoolConfig;
use crate::health::probe::{probe_with_timeout, HealthProbe};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pool::connection::{ConnectionFactory, ConnectionHandle, ConnectionId};
use crate::pool::error::PoolError;
use crate::pool::ring::Ring;
use crate::pool::state::{AtomicPoolState, PoolState};
use crate::pool::stats::{PoolCounters, PoolStats};
use crate::transport::ConnectorError;

type Conn<F> = <F as ConnectionFactory>::Connection;

/// Pool of pre-established connections rotated on a fixed schedule.
///
/// Cloning is cheap; every clone drives the same pool.
pub struct ConnectionPool<F, P>
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    inner: Arc<PoolInner<F, P>>,
}

impl<F, P> Clone for ConnectionPool<F, P>
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<F, P>
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    config: PoolConfig,
    factory: F,
    probe: P,
    ring: Mutex<Ring<Conn<F>>>,
    /// Mirrors the ring length so stats never wait on the ring lock.
    ring_len: AtomicUsize,
    active: ArcSwapOption<Conn<F>>,
    state: AtomicPoolState,
    next_rotation: StdMutex<Option<Instant>>,
    counters: PoolCounters,
    /// Held by initialize and shutdown; owns the rotation task.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    /// Replaced on every initialize so a re-initialized pool starts untriggered.
    shutdown: StdMutex<Arc<Shutdown>>,
}

impl<F, P> ConnectionPool<F, P>
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    /// Build an uninitialized pool. No connection is opened until the first
    /// `initialize` or `get_connection`.
    pub fn new(factory: F, probe: P, config: PoolConfig) -> Result<Self, PoolError> {
        if let Err(errors) = validate_pool(&config) {
            let joined = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            return Err(PoolError::InvalidConfig(joined));
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                probe,
                ring: Mutex::new(Ring::default()),
                ring_len: AtomicUsize::new(0),
                active: ArcSwapOption::empty(),
                state: AtomicPoolState::new(PoolState::Uninitialized),
                next_rotation: StdMutex::new(None),
                counters: PoolCounters::default(),
                lifecycle: Mutex::new(None),
                shutdown: StdMutex::new(Arc::new(Shutdown::new())),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn state(&self) -> PoolState {
        self.inner.state.load()
    }

    /// Open the initial connections and start the rotation task.
    ///
    /// Idempotent: a Ready pool returns immediately. Creation failures are skipped
    /// as long as at least one connection comes up.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let mut task = self.inner.lifecycle.lock().await;
        if !self.inner.state.load().can_initialize() {
            return Ok(());
        }

        let size = self.inner.config.size;
        self.inner.state.store(PoolState::Initializing);
        tracing::info!(size, "Initializing connection pool");

        let mut members = Vec::with_capacity(size);
        let mut last_error = None;
        for attempt in 1..=size {
            match self.inner.create_connection().await {
                Ok(conn) => {
                    tracing::debug!(connection = %conn.id(), attempt, size, "Created pooled connection");
                    members.push(conn);
                }
                Err(e) => {
                    tracing::error!(attempt, size, error = %e, "Failed to create initial connection");
                    last_error = Some(e);
                }
            }
        }

        if members.is_empty() {
            self.inner.state.store(PoolState::Uninitialized);
            let source = last_error.unwrap_or_else(|| ConnectorError::Connect("pool size is zero".into()));
            return Err(PoolError::Exhausted { source });
        }

        {
            let mut ring = self.inner.ring.lock().await;
            *ring = Ring::from_members(members);
            self.inner.active.store(ring.active().cloned());
            self.inner.set_ring_len(ring.len());
        }
        self.inner.schedule_next_rotation(self.inner.config.rotation_interval());

        let shutdown = Arc::new(Shutdown::new());
        let receiver = shutdown.subscribe();
        *self.inner.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = shutdown;

        self.inner.state.store(PoolState::Ready);
        *task = Some(tokio::spawn(rotation_loop(Arc::clone(&self.inner), receiver)));

        tracing::info!(
            connections = self.inner.ring_len.load(Ordering::Relaxed),
            rotation_interval = ?self.inner.config.rotation_interval(),
            "Connection pool ready"
        );
        Ok(())
    }

    /// Return a healthy connection, initializing the pool on first use.
    ///
    /// When the active connection fails its probe, an emergency rotation picks the
    /// next healthy member or creates a new one.
    pub async fn get_connection(&self) -> Result<Arc<Conn<F>>, PoolError> {
        match self.inner.state.load() {
            PoolState::Ready => {}
            PoolState::ShuttingDown => return Err(PoolError::ShuttingDown),
            _ => self.initialize().await?,
        }

        let current = self.inner.active.load_full();
        if let Some(conn) = &current {
            if self.inner.probe(conn).await {
                return Ok(Arc::clone(conn));
            }
            tracing::warn!(connection = %conn.id(), "Active connection unhealthy, rotating");
        }

        self.inner.emergency_rotation(current).await
    }

    /// Stop rotating and close every pooled connection. Idempotent.
    pub async fn shutdown(&self) {
        let mut task = self.inner.lifecycle.lock().await;
        if self.inner.state.load() != PoolState::Ready {
            return;
        }

        tracing::info!("Shutting down connection pool");
        self.inner.current_shutdown().trigger();
        self.inner.state.store(PoolState::ShuttingDown);

        if let Some(mut handle) = task.take() {
            match time::timeout(self.inner.config.shutdown_timeout(), &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Rotation task ended abnormally"),
                Err(_) => {
                    tracing::warn!("Rotation task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let members = {
            let mut ring = self.inner.ring.lock().await;
            self.inner.active.store(None);
            self.inner.set_ring_len(0);
            ring.drain()
        };
        for conn in &members {
            if let Err(e) = conn.close().await {
                tracing::debug!(connection = %conn.id(), error = %e, "Error closing connection during shutdown");
            }
        }
        *self.inner.next_rotation.lock().unwrap_or_else(PoisonError::into_inner) = None;

        self.inner.state.store(PoolState::Closed);
        tracing::info!(closed = members.len(), "Connection pool shutdown complete");
    }

    pub fn get_stats(&self) -> PoolStats {
        let next_rotation_in = self
            .inner
            .next_rotation_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        self.inner.counters.snapshot(
            self.inner.state.load(),
            self.inner.ring_len.load(Ordering::Relaxed),
            next_rotation_in,
        )
    }

    /// Ids of the ring members in slot order.
    pub async fn member_ids(&self) -> Vec<ConnectionId> {
        self.inner.ring.lock().await.ids()
    }

    /// Id of the active connection without probing it.
    pub fn active_id(&self) -> Option<ConnectionId> {
        self.inner.active.load().as_ref().map(|conn| conn.id())
    }
}

impl<F, P> std::fmt::Debug for ConnectionPool<F, P>
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("state", &self.inner.state.load())
            .field("size", &self.inner.ring_len.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<F, P> PoolInner<F, P>
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    async fn probe(&self, conn: &Conn<F>) -> bool {
        probe_with_timeout(&self.probe, conn, self.config.probe_timeout()).await
    }

    async fn create_connection(&self) -> Result<Arc<Conn<F>>, ConnectorError> {
        let timeout = self.config.connect_timeout();
        let conn = time::timeout(timeout, self.factory.create())
            .await
            .map_err(|_| ConnectorError::Timeout(timeout))??;
        self.counters.connection_created();
        metrics::record_connection_created();
        Ok(Arc::new(conn))
    }

    async fn close_quietly(&self, conn: &Conn<F>) {
        if let Err(e) = conn.close().await {
            tracing::debug!(connection = %conn.id(), error = %e, "Error closing connection");
        }
    }

    fn current_shutdown(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn next_rotation_deadline(&self) -> Option<Instant> {
        *self.next_rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_next_rotation(&self, after: Duration) {
        *self.next_rotation.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now() + after);
    }

    fn set_ring_len(&self, len: usize) {
        self.ring_len.store(len, Ordering::Relaxed);
        metrics::record_pool_size(len);
    }

    /// Scheduled rotation to the next ring member.
    async fn rotate(self: &Arc<Self>) -> Result<(), PoolError> {
        let start = Instant::now();
        let mut ring = self.ring.lock().await;
        if self.state.load() != PoolState::Ready {
            self.schedule_next_rotation(self.config.retry_delay());
            return Ok(());
        }
        let Some(next) = ring.next_index() else {
            self.schedule_next_rotation(self.config.retry_delay());
            return Ok(());
        };

        tracing::debug!("Starting predictive connection rotation");
        let previous = self.active.load_full();
        let candidate = match ring.get(next) {
            Some(conn) => Arc::clone(conn),
            None => return Ok(()),
        };

        let promoted = if self.probe(&candidate).await {
            candidate
        } else {
            tracing::warn!(connection = %candidate.id(), "Next connection in pool is unhealthy, creating new one");
            let fresh = self.create_connection().await.map_err(PoolError::Rotation)?;
            ring.replace(next, Arc::clone(&fresh));
            self.close_quietly(&candidate).await;
            fresh
        };

        ring.set_cursor(next);
        self.active.store(Some(Arc::clone(&promoted)));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &promoted) {
                self.retire(previous);
            }
        }

        let elapsed = start.elapsed();
        self.counters.rotation_succeeded(elapsed);
        metrics::record_rotation("scheduled", true, elapsed);
        self.schedule_next_rotation(self.config.rotation_interval());
        tracing::info!(connection = %promoted.id(), ?elapsed, "Connection rotation completed");

        if ring.len() < self.config.size {
            match self.create_connection().await {
                Ok(conn) => {
                    tracing::debug!(connection = %conn.id(), "Added connection to short pool");
                    ring.push(conn);
                }
                Err(e) => tracing::warn!(error = %e, "Failed to top up connection pool"),
            }
        }
        self.set_ring_len(ring.len());

        Ok(())
    }

    /// Replace an unhealthy active connection on the request path.
    async fn emergency_rotation(&self, failed: Option<Arc<Conn<F>>>) -> Result<Arc<Conn<F>>, PoolError> {
        let start = Instant::now();
        let mut ring = self.ring.lock().await;
        if self.state.load() != PoolState::Ready {
            return Err(PoolError::ShuttingDown);
        }

        // Another caller or the rotation task may have swapped it while we waited.
        if let Some(current) = self.active.load_full() {
            let replaced = failed.as_ref().map_or(true, |f| !Arc::ptr_eq(f, &current));
            if replaced && self.probe(&current).await {
                return Ok(current);
            }
        }

        tracing::warn!("Performing emergency connection rotation");
        for index in ring.indices_after_cursor() {
            let Some(candidate) = ring.get(index).cloned() else {
                continue;
            };
            if self.probe(&candidate).await {
                ring.set_cursor(index);
                self.active.store(Some(Arc::clone(&candidate)));
                self.finish_emergency(start);
                tracing::info!(connection = %candidate.id(), "Found healthy connection in pool");
                return Ok(candidate);
            }
        }

        tracing::warn!("No healthy connections in pool, creating new connection");
        match self.create_connection().await {
            Ok(fresh) => {
                let replaced = ring.install_active(Arc::clone(&fresh));
                self.active.store(Some(Arc::clone(&fresh)));
                self.set_ring_len(ring.len());
                if let Some(old) = replaced {
                    self.close_quietly(&old).await;
                }
                self.finish_emergency(start);
                tracing::info!(connection = %fresh.id(), "Emergency connection established");
                Ok(fresh)
            }
            Err(e) => {
                tracing::error!(error = %e, "Emergency rotation failed");
                self.counters.rotation_failed();
                metrics::record_rotation("emergency", false, start.elapsed());
                Err(PoolError::Exhausted { source: e })
            }
        }
    }

    fn finish_emergency(&self, start: Instant) {
        self.counters.emergency_rotation();
        metrics::record_rotation("emergency", true, start.elapsed());
        self.schedule_next_rotation(self.config.rotation_interval());
    }

    /// Close a rotated-out connection once in-flight work had time to drain.
    fn retire(self: &Arc<Self>, old: Arc<Conn<F>>) {
        let shutdown = self.current_shutdown();
        let mut signal = shutdown.subscribe();
        if shutdown.is_triggered() {
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(inner.config.grace_delay()) => {}
                // Shutdown closes every ring member itself.
                _ = signal.recv() => return,
            }
            inner.close_retired(old).await;
        });
    }

    async fn close_retired(&self, old: Arc<Conn<F>>) {
        let mut ring = self.ring.lock().await;
        let still_active = self
            .active
            .load()
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, &old));
        if still_active {
            tracing::debug!(connection = %old.id(), "Retired connection is active again, keeping it open");
            return;
        }

        self.close_quietly(&old).await;
        tracing::debug!(connection = %old.id(), "Closed rotated-out connection");

        if !self.config.replenish_retired || self.state.load() != PoolState::Ready {
            return;
        }
        if let Some(slot) = ring.position(&old) {
            match self.create_connection().await {
                Ok(fresh) => {
                    tracing::debug!(connection = %fresh.id(), replaced = %old.id(), "Replaced retired connection");
                    ring.replace(slot, fresh);
                }
                Err(e) => tracing::warn!(error = %e, "Failed to replace retired connection"),
            }
        }
    }
}

async fn rotation_loop<F, P>(inner: Arc<PoolInner<F, P>>, mut shutdown: broadcast::Receiver<()>)
where
    F: ConnectionFactory,
    P: HealthProbe<Conn<F>>,
{
    tracing::debug!("Connection rotation task started");
    loop {
        let deadline = inner
            .next_rotation_deadline()
            .unwrap_or_else(|| Instant::now() + inner.config.rotation_interval());

        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!("Connection rotation task received shutdown signal, exiting loop");
                break;
            }
            _ = time::sleep_until(deadline) => {}
        }

        // An emergency rotation may have pushed the deadline back while we slept.
        if inner.next_rotation_deadline().is_some_and(|next| next > Instant::now()) {
            continue;
        }

        let start = Instant::now();
        if let Err(e) = inner.rotate().await {
            tracing::error!(error = %e, retry_in = ?inner.config.retry_delay(), "Failed to rotate connection");
            inner.counters.rotation_failed();
            metrics::record_rotation("scheduled", false, start.elapsed());
            inner.schedule_next_rotation(inner.config.retry_delay());
        }
    }
}
