//! Cache error types

use crate::request::RequestKind;
use thiserror::Error;

/// Gatekeeper cache error type
///
/// None of these are fatal to the caller: a failed add behaves as
/// "not cached" and the caller proceeds without the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Request failed validation
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Device-scoped operation without a device address
    #[error("device address required")]
    MissingDevice,

    /// Request kind not valid for this operation
    #[error("unsupported request kind: {0:?}")]
    UnsupportedKind(RequestKind),

    /// Shared handle used before init or after cleanup
    #[error("cache not initialized")]
    NotInitialized,

    /// Nothing can be evicted to make room
    #[error("cache capacity exhausted")]
    CapacityExhausted,

    /// Capacity change refused while entries are cached
    #[error("cache holds {0} entries, capacity can only change when empty")]
    CacheInUse(usize),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
