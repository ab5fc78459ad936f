//! Clock sources
//!
//! Expiry decisions never read the wall clock directly; they go through a
//! [`Clock`] so tests can move time forward without sleeping.

use crate::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline(always)]
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock for tests and replay
///
/// Starts at the given timestamp and only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos()),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, delta: Duration) {
        let step = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(step, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}
