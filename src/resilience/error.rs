//! Error classification for breaker bookkeeping.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse category of an operation failure.
///
/// The breaker consults its excluded set with this value to decide whether a
/// failure counts toward opening the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The operation was cancelled before it completed.
    Cancelled,
    /// The operation did not finish within its deadline.
    Timeout,
    /// Transport-level failure (refused, reset, closed).
    Connection,
    /// The remote rejected the call because of rate limiting.
    RateLimited,
    /// Authentication or authorization was rejected.
    Auth,
    /// The remote reported an internal failure.
    Server,
    /// Anything else.
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Auth => "auth",
            ErrorKind::Server => "server",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match std::io::Error::kind(self) {
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::UnexpectedEof => ErrorKind::Connection,
            Io::PermissionDenied => ErrorKind::Auth,
            _ => ErrorKind::Other,
        }
    }
}

impl Classify for tokio::time::error::Elapsed {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Timeout
    }
}

impl Classify for tokio::task::JoinError {
    fn kind(&self) -> ErrorKind {
        if self.is_cancelled() {
            ErrorKind::Cancelled
        } else {
            ErrorKind::Other
        }
    }
}

/// Error returned by [`CircuitBreaker::run`](crate::resilience::circuit_breaker::CircuitBreaker::run).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("circuit breaker '{name}' is open (retry in {retry_in:?})")]
    Open { name: String, retry_in: Duration },

    /// The operation itself failed.
    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True when the call was rejected without being attempted.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Return the operation error, if the operation ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}
