//! Gatekeeper Common - Shared types for the gatekeeper verdict cache
//!
//! This crate provides the vocabulary shared between the verdict cache and
//! the collaborators that feed it:
//! - Device hardware addresses
//! - Verdict actions and flush-rule operators
//! - 5-tuple flow keys
//! - Clocks and timestamps
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod flow;
pub mod mac;
pub mod policy;

pub use clock::*;
pub use error::*;
pub use flow::*;
pub use mac::MacAddr;
pub use policy::*;

use std::time::Duration;

/// Nanosecond timestamp (nanoseconds since the Unix epoch)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Get current wall-clock timestamp
    #[inline(always)]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self(nanos)
    }

    /// Build from raw nanoseconds
    #[inline(always)]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Build from whole seconds
    #[inline(always)]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Get nanoseconds value
    #[inline(always)]
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get whole seconds value
    #[inline(always)]
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is in the future
    #[inline(always)]
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}
