//! Process-wide cache handle
//!
//! One mutex serializes every operation. Lookups take the lock too since
//! they bump hit counters and move entries in the recency order.
//! Before `init` and after `cleanup`, every operation fails softly.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::manager::GatekeeperCache;
use crate::request::{AddOutcome, AttributeRequest, CacheVerdict, FlowRequest};
use crate::stats::CacheStats;
use gk_common::{Clock, FlushRules, GkResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Mutex-guarded gatekeeper cache with explicit init/cleanup
#[derive(Debug, Default)]
pub struct SharedGatekeeperCache {
    inner: Mutex<Option<GatekeeperCache>>,
}

impl SharedGatekeeperCache {
    /// Uninitialized handle
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Create the cache. A second init keeps the existing cache.
    pub fn init(&self, config: CacheConfig) -> GkResult<()> {
        config.validate()?;
        let mut guard = self.inner.lock();
        if guard.is_some() {
            debug!("gatekeeper cache already initialized");
            return Ok(());
        }
        *guard = Some(GatekeeperCache::new(config));
        Ok(())
    }

    /// Create the cache on a custom clock
    pub fn init_with_clock(&self, config: CacheConfig, clock: Arc<dyn Clock>) -> GkResult<()> {
        config.validate()?;
        let mut guard = self.inner.lock();
        if guard.is_some() {
            debug!("gatekeeper cache already initialized");
            return Ok(());
        }
        *guard = Some(GatekeeperCache::with_clock(config, clock));
        Ok(())
    }

    /// Release every entry and return to the uninitialized state
    pub fn cleanup(&self) -> usize {
        let Some(mut cache) = self.inner.lock().take() else {
            return 0;
        };
        let removed = cache.clear();
        info!(removed, "gatekeeper cache cleaned up");
        removed
    }

    /// True between `init` and `cleanup`
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Run `f` against the cache under the lock
    pub fn with<R>(&self, f: impl FnOnce(&mut GatekeeperCache) -> R) -> CacheResult<R> {
        let mut guard = self.inner.lock();
        let cache = guard.as_mut().ok_or(CacheError::NotInitialized)?;
        Ok(f(cache))
    }

    /// See [`GatekeeperCache::add_attribute`]
    pub fn add_attribute(&self, req: &AttributeRequest) -> CacheResult<AddOutcome> {
        self.with(|c| c.add_attribute(req))?
    }

    /// See [`GatekeeperCache::upsert_attribute`]
    pub fn upsert_attribute(&self, req: &AttributeRequest) -> CacheResult<AddOutcome> {
        self.with(|c| c.upsert_attribute(req))?
    }

    /// Attribute lookup, a miss when uninitialized
    pub fn lookup_attribute(&self, req: &AttributeRequest, update_count: bool) -> Option<CacheVerdict> {
        self.with(|c| c.lookup_attribute(req, update_count)).ok().flatten()
    }

    /// Attribute delete, false when uninitialized
    pub fn delete_attribute(&self, req: &AttributeRequest) -> bool {
        self.with(|c| c.delete_attribute(req)).unwrap_or(false)
    }

    /// See [`GatekeeperCache::add_flow`]
    pub fn add_flow(&self, req: &FlowRequest) -> CacheResult<AddOutcome> {
        self.with(|c| c.add_flow(req))?
    }

    /// Flow lookup, a miss when uninitialized
    pub fn lookup_flow(&self, req: &FlowRequest, update_count: bool) -> Option<CacheVerdict> {
        self.with(|c| c.lookup_flow(req, update_count)).ok().flatten()
    }

    /// Flow delete, false when uninitialized
    pub fn delete_flow(&self, req: &FlowRequest) -> bool {
        self.with(|c| c.delete_flow(req)).unwrap_or(false)
    }

    /// Sweep expired entries, 0 when uninitialized
    pub fn sweep_expired(&self) -> usize {
        self.with(GatekeeperCache::sweep_expired).unwrap_or(0)
    }

    /// See [`GatekeeperCache::flush_rules`]
    pub fn flush_rules(&self, rules: &FlushRules) -> CacheResult<usize> {
        self.with(|c| c.flush_rules(rules))
    }

    /// See [`GatekeeperCache::flush_all`]
    pub fn flush_all(&self, rules: &FlushRules) -> CacheResult<usize> {
        self.with(|c| c.flush_all(rules))
    }

    /// Cached entries, 0 when uninitialized
    pub fn entry_count(&self) -> usize {
        self.with(|c| c.entry_count()).unwrap_or(0)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> Option<CacheStats> {
        self.with(|c| c.stats()).ok()
    }
}
