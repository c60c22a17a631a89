//! Circuit breaker for upstream dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: trial calls let through to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: current_timeout elapsed since last failure
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any counted failure
//! ```
//!
//! # Design Decisions
//! - Per-dependency breaker (not global), owned by a registry
//! - Every open transition multiplies the recovery timeout; only a close resets it
//! - The breaker never retries; retry policy belongs to the caller
//! - State lock is never held across an await

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::{metrics, serialize_secs};
use crate::resilience::backoff::next_timeout;
use crate::resilience::error::{BreakerError, Classify, ErrorKind};

/// Number of failures reported by [`CircuitBreaker::get_status`].
const RECENT_ERRORS: usize = 5;

/// Lifecycle state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("closed"),
            CircuitState::Open => f.write_str("open"),
            CircuitState::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// One entry of the failure history.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    /// Wall-clock time of the failure, seconds since the Unix epoch.
    pub timestamp: f64,
    pub kind: ErrorKind,
    pub message: String,
}

/// Emitted to listeners on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Callback invoked after a state change, outside the breaker lock.
pub type StateListener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Snapshot returned by [`CircuitBreaker::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub consecutive_failures: u32,
    #[serde(serialize_with = "serialize_secs")]
    pub current_timeout: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub time_in_state: Duration,
    pub recent_errors: Vec<FailureRecord>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Failures since the last success or close; survives Closed → Open → HalfOpen.
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_transition: Instant,
    current_timeout: Duration,
    history: VecDeque<FailureRecord>,
}

impl BreakerState {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            consecutive_failures: 0,
            last_failure: None,
            last_transition: Instant::now(),
            current_timeout: config.initial_timeout(),
            history: VecDeque::with_capacity(config.history_capacity.min(128)),
        }
    }
}

/// Gate around calls to one logical dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    listeners: Vec<StateListener>,
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let state = Mutex::new(BreakerState::new(&config));
        Self {
            name: name.into(),
            config,
            state,
            listeners: Vec::new(),
        }
    }

    /// Register a state-change listener.
    pub fn with_listener(mut self, listener: StateListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without triggering the Open → HalfOpen check.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current recovery timeout.
    pub fn current_timeout(&self) -> Duration {
        self.lock().current_timeout
    }

    /// Run `operation` under breaker protection.
    ///
    /// Returns [`BreakerError::Open`] without calling `operation` while the circuit is
    /// open. Otherwise the operation runs exactly once and its error, if any, is handed
    /// back as [`BreakerError::Operation`] after bookkeeping.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                let kind = error.kind();
                if self.config.is_excluded(kind) {
                    tracing::debug!(breaker = %self.name, kind = %kind, "Excluded error, not counted");
                } else {
                    self.on_failure(kind, error.to_string());
                }
                Err(BreakerError::Operation(error))
            }
        }
    }

    /// Turn an operation factory into a reusable protected call.
    pub fn wrap<F, Fut, T, E>(
        self: &Arc<Self>,
        operation: F,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, BreakerError<E>>> + Send + Sync
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + Display + Send + 'static,
    {
        let breaker = Arc::clone(self);
        let operation = Arc::new(operation);
        move || {
            let breaker = Arc::clone(&breaker);
            let operation = Arc::clone(&operation);
            Box::pin(async move { breaker.run(|| (*operation)()).await })
        }
    }

    /// Status snapshot for dashboards and logs.
    pub fn get_status(&self) -> BreakerStatus {
        let st = self.lock();
        let skip = st.history.len().saturating_sub(RECENT_ERRORS);
        BreakerStatus {
            name: self.name.clone(),
            state: st.state,
            failure_count: st.failure_count,
            success_count: st.success_count,
            consecutive_failures: st.consecutive_failures,
            current_timeout: st.current_timeout,
            time_in_state: st.last_transition.elapsed(),
            recent_errors: st.history.iter().skip(skip).cloned().collect(),
        }
    }

    /// Force the breaker back to its initial Closed state.
    pub fn reset(&self) {
        let change = {
            let mut st = self.lock();
            let change = self.transition(&mut st, CircuitState::Closed);
            st.failure_count = 0;
            st.success_count = 0;
            st.consecutive_failures = 0;
            st.current_timeout = self.config.initial_timeout();
            st.last_failure = None;
            change
        };
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset");
        self.notify(change);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire<E>(&self) -> Result<(), BreakerError<E>> {
        let change = {
            let mut st = self.lock();
            if st.state != CircuitState::Open {
                return Ok(());
            }

            let elapsed = st.last_failure.map(|at| at.elapsed());
            match elapsed {
                Some(elapsed) if elapsed < st.current_timeout => {
                    let retry_in = st.current_timeout - elapsed;
                    drop(st);
                    metrics::record_circuit_rejection(&self.name);
                    tracing::debug!(breaker = %self.name, ?retry_in, "Circuit open, call rejected");
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_in,
                    });
                }
                _ => self.transition(&mut st, CircuitState::HalfOpen),
            }
        };
        self.notify(change);
        Ok(())
    }

    fn on_success(&self) {
        let change = {
            let mut st = self.lock();
            st.consecutive_failures = 0;
            match st.state {
                CircuitState::HalfOpen => {
                    st.success_count += 1;
                    tracing::debug!(
                        breaker = %self.name,
                        successes = st.success_count,
                        threshold = self.config.success_threshold,
                        "Success in half-open state"
                    );
                    if st.success_count >= self.config.success_threshold {
                        let change = self.transition(&mut st, CircuitState::Closed);
                        st.current_timeout = self.config.initial_timeout();
                        change
                    } else {
                        None
                    }
                }
                CircuitState::Closed => {
                    st.failure_count = 0;
                    None
                }
                // A call admitted before the circuit opened; it does not close it.
                CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    fn on_failure(&self, kind: ErrorKind, message: String) {
        let change = {
            let mut st = self.lock();
            st.last_failure = Some(Instant::now());
            if st.history.len() >= self.config.history_capacity {
                st.history.pop_front();
            }
            st.history.push_back(FailureRecord {
                timestamp: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs_f64(),
                kind,
                message: message.clone(),
            });
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            metrics::record_circuit_failure(&self.name, kind);

            match st.state {
                CircuitState::Closed => {
                    st.failure_count += 1;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = st.failure_count,
                        threshold = self.config.failure_threshold,
                        kind = %kind,
                        error = %message,
                        "Counted failure"
                    );
                    if st.failure_count >= self.config.failure_threshold {
                        self.open(&mut st)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    tracing::warn!(breaker = %self.name, error = %message, "Failure in half-open state, reopening");
                    self.open(&mut st)
                }
                CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    fn open(&self, st: &mut BreakerState) -> Option<StateChange> {
        let change = self.transition(st, CircuitState::Open);
        st.current_timeout = next_timeout(
            st.current_timeout,
            self.config.backoff_multiplier,
            self.config.max_timeout(),
        );
        tracing::info!(breaker = %self.name, timeout = ?st.current_timeout, "Recovery timeout increased");
        change
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState) -> Option<StateChange> {
        if st.state == to {
            return None;
        }
        let from = st.state;
        st.state = to;
        st.failure_count = 0;
        st.success_count = 0;
        st.last_transition = Instant::now();
        if to == CircuitState::Closed {
            st.consecutive_failures = 0;
        }

        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state changed");
        metrics::record_circuit_state(&self.name, to);

        Some(StateChange {
            breaker: self.name.clone(),
            from,
            to,
        })
    }

    fn notify(&self, change: Option<StateChange>) {
        if let Some(change) = change {
            for listener in &self.listeners {
                listener(&change);
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(ErrorKind);

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test failure ({})", self.0)
        }
    }

    impl Classify for TestError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    fn config(failures: u32, successes: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            initial_timeout_ms: 1_000,
            max_timeout_ms: 10_000,
            backoff_multiplier: 2.0,
            ..CircuitBreakerConfig::default()
        }
    }

    async fn fail(breaker: &CircuitBreaker, kind: ErrorKind) -> BreakerError<TestError> {
        breaker
            .run(|| async move { Err::<(), _>(TestError(kind)) })
            .await
            .unwrap_err()
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<TestError>> {
        breaker.run(|| async { Ok::<_, TestError>(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_skips_operation() {
        let breaker = CircuitBreaker::new("orders", config(3, 1));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let err = breaker
                .run(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError(ErrorKind::Server))
                })
                .await
                .unwrap_err();
            assert!(!err.is_open());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_forgives_failures_in_closed() {
        let breaker = CircuitBreaker::new("balances", config(3, 1));
        fail(&breaker, ErrorKind::Server).await;
        fail(&breaker, ErrorKind::Server).await;
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        fail(&breaker, ErrorKind::Server).await;
        fail(&breaker, ErrorKind::Server).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.get_status().failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let breaker = CircuitBreaker::new("ticker", config(1, 2));
        fail(&breaker, ErrorKind::Connection).await;
        // First open doubles the initial 1s timeout.
        assert_eq!(breaker.current_timeout(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_millis(1_999)).await;
        let err = succeed(&breaker).await.unwrap_err();
        match err {
            BreakerError::Open { retry_in, .. } => assert_eq!(retry_in, Duration::from_millis(1)),
            other => panic!("unexpected: {other:?}"),
        }

        tokio::time::advance(Duration::from_millis(1)).await;
        let calls = AtomicU32::new(0);
        breaker
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.get_status().success_count, 1);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.current_timeout(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("depth", config(2, 5));
        fail(&breaker, ErrorKind::Server).await;
        fail(&breaker, ErrorKind::Server).await;
        tokio::time::advance(Duration::from_secs(2)).await;

        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        fail(&breaker, ErrorKind::Server).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.current_timeout(), Duration::from_secs(4));
        assert_eq!(breaker.get_status().success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let breaker = CircuitBreaker::new("trades", config(1, 1));
        let mut expected = Duration::from_secs(1);
        for _ in 0..6 {
            fail(&breaker, ErrorKind::Timeout).await;
            expected = (expected * 2).min(Duration::from_secs(10));
            assert_eq!(breaker.current_timeout(), expected);
            tokio::time::advance(expected).await;
        }
        assert_eq!(breaker.current_timeout(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_errors_do_not_count() {
        let breaker = CircuitBreaker::new("account", config(1, 1));
        for _ in 0..5 {
            let err = fail(&breaker, ErrorKind::Cancelled).await;
            assert!(matches!(err, BreakerError::Operation(TestError(ErrorKind::Cancelled))));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.get_status().recent_errors.is_empty());

        fail(&breaker, ErrorKind::Server).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(fail(&breaker, ErrorKind::Cancelled).await.is_open());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_error_in_half_open_keeps_state() {
        let breaker = CircuitBreaker::new("account", config(1, 3));
        fail(&breaker, ErrorKind::Server).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        fail(&breaker, ErrorKind::Cancelled).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.get_status().success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_history() {
        let mut cfg = config(10, 1);
        cfg.history_capacity = 3;
        let breaker = CircuitBreaker::new("status", cfg);
        for _ in 0..4 {
            fail(&breaker, ErrorKind::RateLimited).await;
        }

        let status = breaker.get_status();
        assert_eq!(status.name, "status");
        assert_eq!(status.failure_count, 4);
        assert_eq!(status.consecutive_failures, 4);
        assert_eq!(status.recent_errors.len(), 3);
        assert_eq!(status.recent_errors[0].kind, ErrorKind::RateLimited);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "closed");
        assert_eq!(json["current_timeout"], 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_errors_limited_to_five() {
        let breaker = CircuitBreaker::new("recent", config(50, 1));
        for _ in 0..8 {
            fail(&breaker, ErrorKind::Other).await;
        }
        assert_eq!(breaker.get_status().recent_errors.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let breaker = CircuitBreaker::new("reset", config(1, 1));
        fail(&breaker, ErrorKind::Server).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        let status = breaker.get_status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(breaker.current_timeout(), Duration::from_secs(1));
        assert!(succeed(&breaker).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_sees_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let breaker = CircuitBreaker::new("listen", config(1, 1)).with_listener(Arc::new(move |c: &StateChange| {
            sink.lock().unwrap().push((c.from, c.to));
        }));

        fail(&breaker, ErrorKind::Server).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        succeed(&breaker).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_reuses_operation() {
        let breaker = Arc::new(CircuitBreaker::new("wrapped", config(2, 1)));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let protected = breaker.wrap(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError(ErrorKind::Server))
            }
        });

        assert!(!protected().await.unwrap_err().is_open());
        assert!(!protected().await.unwrap_err().is_open());
        assert!(protected().await.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_leaves_state_untouched() {
        let breaker = CircuitBreaker::new("dropped", config(1, 1));
        let pending = breaker.run(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err::<(), _>(TestError(ErrorKind::Server))
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.get_status().consecutive_failures, 0);
    }
}
