//! Pool lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Uninitialized → Initializing → Ready → ShuttingDown → Closed
//! Initializing → Uninitialized (no connection could be created)
//! Closed → Initializing (re-initialization after shutdown)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl From<u8> for PoolState {
    fn from(val: u8) -> Self {
        match val {
            1 => PoolState::Initializing,
            2 => PoolState::Ready,
            3 => PoolState::ShuttingDown,
            4 => PoolState::Closed,
            _ => PoolState::Uninitialized,
        }
    }
}

impl PoolState {
    /// States from which `initialize` may start.
    pub fn can_initialize(self) -> bool {
        matches!(self, PoolState::Uninitialized | PoolState::Closed)
    }
}

/// Atomic cell holding a [`PoolState`].
#[derive(Debug)]
pub struct AtomicPoolState(AtomicU8);

impl AtomicPoolState {
    pub fn new(state: PoolState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> PoolState {
        PoolState::from(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: PoolState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_u8() {
        let cell = AtomicPoolState::new(PoolState::Uninitialized);
        for state in [
            PoolState::Initializing,
            PoolState::Ready,
            PoolState::ShuttingDown,
            PoolState::Closed,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
        assert_eq!(PoolState::from(200), PoolState::Uninitialized);
    }

    #[test]
    fn test_can_initialize() {
        assert!(PoolState::Uninitialized.can_initialize());
        assert!(PoolState::Closed.can_initialize());
        assert!(!PoolState::Ready.can_initialize());
        assert!(!PoolState::ShuttingDown.can_initialize());
    }
}
