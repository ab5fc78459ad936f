//! Gatekeeper cache manager
//!
//! Owns the device map, the location-wide trees, the running entry count
//! and the recency index. Every add, delete, sweep and flush goes through
//! here so the count always equals what a full traversal would find.

use crate::config::CacheConfig;
use crate::device::{AttributeTrees, DeviceCache};
use crate::entry::{AttrEntry, AttrValue, FlowEntry};
use crate::error::{CacheError, CacheResult};
use crate::recency::{EntryHandle, RecencyIndex, Scope};
use crate::request::{AddOutcome, AttributeRequest, CacheVerdict, FlowRequest, RequestKind};
use gk_common::{Clock, MacAddr, SystemClock, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

enum AttrLookup {
    Hit(CacheVerdict),
    Expired,
    Miss,
}

/// Per-device verdict cache
#[derive(Debug)]
pub struct GatekeeperCache {
    capacity: usize,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    pub(crate) devices: BTreeMap<MacAddr, DeviceCache>,
    pub(crate) location: AttributeTrees,
    pub(crate) total_entries: usize,
    pub(crate) recency: RecencyIndex,
}

impl Default for GatekeeperCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl GatekeeperCache {
    /// Create an empty cache on the wall clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an empty cache on a custom clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            capacity = config.capacity,
            default_ttl_secs = config.default_ttl_secs,
            "gatekeeper cache initialized"
        );
        Self {
            capacity: config.capacity,
            default_ttl: config.default_ttl(),
            clock,
            devices: BTreeMap::new(),
            location: AttributeTrees::default(),
            total_entries: 0,
            recency: RecencyIndex::new(),
        }
    }

    #[inline(always)]
    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Cache an attribute verdict
    ///
    /// FQDN, HOST and SNI requests land in the same hostname tree. Adding a
    /// key that is already cached changes nothing, except that a private
    /// address restarts its TTL. An expired entry that the sweeper has not
    /// reached yet is replaced in place.
    pub fn add_attribute(&mut self, req: &AttributeRequest) -> CacheResult<AddOutcome> {
        let value = AttrValue::parse(req.kind, &req.value).map_err(|e| {
            debug!(kind = ?req.kind, error = %e, "attribute add rejected");
            e
        })?;
        let scope = Scope::from(req.device);
        let ttl = req.ttl.unwrap_or(self.default_ttl);
        let now = self.now();

        if let Some(trees) = self.attr_trees_mut(scope) {
            if let Some(entry) = trees.get_mut(&value) {
                if !entry.is_expired(now) {
                    if entry.private_ip {
                        entry.created_at = now;
                    }
                    trace!(scope = ?scope, value = %value, "attribute already cached");
                    return Ok(AddOutcome::AlreadyPresent);
                }

                *entry = AttrEntry::from_request(req, value.tree(), ttl, now);
                if let Scope::Device(mac) = scope {
                    if let Some(device) = self.devices.get_mut(&mac) {
                        device.record_add(req.kind, req.action);
                    }
                }
                trace!(scope = ?scope, value = %value, ttl = ?ttl, "expired attribute replaced");
                self.recency.touch(&EntryHandle::Attr { scope, value });
                return Ok(AddOutcome::Inserted);
            }
        }

        self.make_room()?;

        let entry = AttrEntry::from_request(req, value.tree(), ttl, now);
        let trees = match scope {
            Scope::Device(mac) => {
                let device = self
                    .devices
                    .entry(mac)
                    .or_insert_with(|| DeviceCache::new(mac));
                device.record_add(req.kind, req.action);
                &mut device.attrs
            }
            Scope::Location => &mut self.location,
        };
        trees.insert(value.clone(), entry);

        self.total_entries += 1;
        trace!(scope = ?scope, kind = ?req.kind, value = %value, ttl = ?ttl, "attribute cached");
        self.recency.insert(EntryHandle::Attr { scope, value });

        Ok(AddOutcome::Inserted)
    }

    /// Add, or refresh the verdict of an existing entry and restart its TTL
    pub fn upsert_attribute(&mut self, req: &AttributeRequest) -> CacheResult<AddOutcome> {
        let value = AttrValue::parse(req.kind, &req.value)?;
        let scope = Scope::from(req.device);
        let ttl = req.ttl.unwrap_or(self.default_ttl);
        let now = self.now();

        if let Some(entry) = self.attr_trees_mut(scope).and_then(|t| t.get_mut(&value)) {
            entry.refresh(req, value.tree(), ttl, now);
            trace!(scope = ?scope, value = %value, "attribute refreshed");
            self.recency.touch(&EntryHandle::Attr { scope, value });
            return Ok(AddOutcome::Refreshed);
        }

        self.add_attribute(req)
    }

    /// Look up an attribute verdict
    ///
    /// Device-scoped lookups fall back to the location-wide trees. A device
    /// that was never seen misses. With `update_count`, the entry's hit
    /// count is bumped before the verdict is returned, and an IP entry
    /// folds in the verdict of the hostname it was resolved from. Only
    /// hits count toward the device's request counter.
    pub fn lookup_attribute(
        &mut self,
        req: &AttributeRequest,
        update_count: bool,
    ) -> Option<CacheVerdict> {
        let value = match AttrValue::parse(req.kind, &req.value) {
            Ok(value) => value,
            Err(e) => {
                debug!(kind = ?req.kind, error = %e, "attribute lookup rejected");
                return None;
            }
        };
        let now = self.now();

        let mut found = AttrLookup::Miss;
        if let Some(mac) = req.device {
            if !self.devices.contains_key(&mac) {
                return None;
            }
            found = self.find_attr(Scope::Device(mac), &value, req.kind, update_count, now);
        }
        if !matches!(found, AttrLookup::Hit(_)) {
            found = self.find_attr(Scope::Location, &value, req.kind, update_count, now);
        }

        match found {
            AttrLookup::Hit(verdict) => {
                if let Some(device) = req.device.and_then(|mac| self.devices.get_mut(&mac)) {
                    device.record_request(req.kind);
                }
                Some(verdict)
            }
            AttrLookup::Expired | AttrLookup::Miss => {
                trace!(device = ?req.device, value = %value, "attribute miss");
                None
            }
        }
    }

    /// Remove an attribute entry. False when nothing was cached.
    pub fn delete_attribute(&mut self, req: &AttributeRequest) -> bool {
        let Ok(value) = AttrValue::parse(req.kind, &req.value) else {
            return false;
        };
        let removed = self.remove_entry(&EntryHandle::Attr {
            scope: Scope::from(req.device),
            value,
        });
        trace!(device = ?req.device, kind = ?req.kind, removed, "attribute delete");
        removed
    }

    fn find_attr(
        &mut self,
        scope: Scope,
        value: &AttrValue,
        kind: RequestKind,
        update_count: bool,
        now: Timestamp,
    ) -> AttrLookup {
        let trees = match scope {
            Scope::Device(mac) => match self.devices.get_mut(&mac) {
                Some(device) => &mut device.attrs,
                None => return AttrLookup::Miss,
            },
            Scope::Location => &mut self.location,
        };
        let Some(entry) = trees.get_mut(value) else {
            return AttrLookup::Miss;
        };

        let handle = EntryHandle::Attr {
            scope,
            value: value.clone(),
        };

        if entry.is_expired(now) {
            trees.remove(value);
            self.total_entries = self.total_entries.saturating_sub(1);
            self.recency.remove(&handle);
            debug!(scope = ?scope, value = %value, "expired attribute dropped on lookup");
            return AttrLookup::Expired;
        }

        if update_count {
            if !entry.resolve_action_by_name() {
                trace!(scope = ?scope, value = %value, "address blocked by name, no verdict of its own");
                return AttrLookup::Miss;
            }
            entry.record_hit(kind);
        }
        let verdict = entry.verdict(kind);
        self.recency.touch(&handle);
        trace!(scope = ?scope, value = %value, hits = verdict.hit_count, "attribute hit");
        AttrLookup::Hit(verdict)
    }

    fn attr_trees_mut(&mut self, scope: Scope) -> Option<&mut AttributeTrees> {
        match scope {
            Scope::Device(mac) => self.devices.get_mut(&mac).map(|d| &mut d.attrs),
            Scope::Location => Some(&mut self.location),
        }
    }

    // ------------------------------------------------------------------
    // Flows
    // ------------------------------------------------------------------

    fn flow_target(req: &FlowRequest) -> CacheResult<(MacAddr, RequestKind)> {
        let mac = req.device.ok_or(CacheError::MissingDevice)?;
        if !req.key.is_well_formed() {
            return Err(CacheError::InvalidInput(
                "flow needs one address family and an inbound or outbound direction",
            ));
        }
        let kind = req
            .kind()
            .ok_or(CacheError::InvalidInput("flow direction must be inbound or outbound"))?;
        Ok((mac, kind))
    }

    /// Cache a flow verdict. Adding a 5-tuple that is already cached
    /// changes nothing. An expired entry that the sweeper has not reached
    /// yet is replaced in place.
    pub fn add_flow(&mut self, req: &FlowRequest) -> CacheResult<AddOutcome> {
        let (mac, kind) = Self::flow_target(req).map_err(|e| {
            debug!(error = %e, "flow add rejected");
            e
        })?;
        let ttl = req.ttl.unwrap_or(self.default_ttl);
        let now = self.now();

        if let Some(device) = self.devices.get_mut(&mac) {
            let cached = device
                .flows_mut(req.key.direction)
                .and_then(|flows| flows.get_mut(&req.key));
            if let Some(entry) = cached {
                if !entry.is_expired(now) {
                    trace!(device = %mac, flow = %req.key, "flow already cached");
                    return Ok(AddOutcome::AlreadyPresent);
                }

                *entry = FlowEntry::from_request(req, ttl, now);
                device.record_add(kind, req.action);
                self.recency.touch(&EntryHandle::Flow {
                    device: mac,
                    key: req.key,
                });
                trace!(device = %mac, flow = %req.key, ttl = ?ttl, "expired flow replaced");
                return Ok(AddOutcome::Inserted);
            }
        }

        self.make_room()?;

        let entry = FlowEntry::from_request(req, ttl, now);
        let device = self
            .devices
            .entry(mac)
            .or_insert_with(|| DeviceCache::new(mac));
        let Some(flows) = device.flows_mut(req.key.direction) else {
            return Err(CacheError::InvalidInput("flow direction must be inbound or outbound"));
        };
        flows.insert(req.key, entry);
        device.record_add(kind, req.action);

        self.total_entries += 1;
        self.recency.insert(EntryHandle::Flow {
            device: mac,
            key: req.key,
        });
        trace!(device = %mac, flow = %req.key, ttl = ?ttl, "flow cached");

        Ok(AddOutcome::Inserted)
    }

    /// Look up a flow verdict by exact 5-tuple and direction
    pub fn lookup_flow(&mut self, req: &FlowRequest, update_count: bool) -> Option<CacheVerdict> {
        let (mac, kind) = match Self::flow_target(req) {
            Ok(target) => target,
            Err(e) => {
                debug!(error = %e, "flow lookup rejected");
                return None;
            }
        };
        let now = self.now();

        let device = self.devices.get_mut(&mac)?;
        let flows = device.flows_mut(req.key.direction)?;
        let entry = flows.get_mut(&req.key)?;

        let handle = EntryHandle::Flow {
            device: mac,
            key: req.key,
        };

        if entry.is_expired(now) {
            flows.remove(&req.key);
            self.total_entries = self.total_entries.saturating_sub(1);
            self.recency.remove(&handle);
            debug!(device = %mac, flow = %req.key, "expired flow dropped on lookup");
            return None;
        }

        if update_count {
            entry.record_hit();
        }
        let verdict = entry.verdict();
        device.record_request(kind);
        self.recency.touch(&handle);
        trace!(device = %mac, flow = %req.key, hits = verdict.hit_count, "flow hit");
        Some(verdict)
    }

    /// Remove a flow entry. False when nothing was cached.
    pub fn delete_flow(&mut self, req: &FlowRequest) -> bool {
        let Ok((mac, _)) = Self::flow_target(req) else {
            return false;
        };
        let removed = self.remove_entry(&EntryHandle::Flow {
            device: mac,
            key: req.key,
        });
        trace!(device = %mac, flow = %req.key, removed, "flow delete");
        removed
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    /// Evict least recently used entries until one more fits
    fn make_room(&mut self) -> CacheResult<()> {
        if self.capacity == 0 {
            return Err(CacheError::CapacityExhausted);
        }
        while self.total_entries >= self.capacity {
            let handle = self
                .recency
                .pop_oldest()
                .ok_or(CacheError::CapacityExhausted)?;
            debug!(handle = ?handle, capacity = self.capacity, "recycling least recently used entry");
            self.remove_stored(&handle);
        }
        Ok(())
    }

    /// Remove an entry from its tree and the count, leaving the recency index
    fn remove_stored(&mut self, handle: &EntryHandle) -> bool {
        let removed = match handle {
            EntryHandle::Attr { scope, value } => self
                .attr_trees_mut(*scope)
                .and_then(|t| t.remove(value))
                .is_some(),
            EntryHandle::Flow { device, key } => self
                .devices
                .get_mut(device)
                .and_then(|d| d.flows_mut(key.direction))
                .and_then(|flows| flows.remove(key))
                .is_some(),
        };
        if removed {
            self.total_entries = self.total_entries.saturating_sub(1);
        }
        removed
    }

    pub(crate) fn remove_entry(&mut self, handle: &EntryHandle) -> bool {
        let removed = self.remove_stored(handle);
        if removed {
            self.recency.remove(handle);
        }
        removed
    }

    /// Account for entries already taken out of their trees
    pub(crate) fn forget<I>(&mut self, handles: I) -> usize
    where
        I: IntoIterator<Item = EntryHandle>,
    {
        let mut count = 0;
        for handle in handles {
            self.recency.remove(&handle);
            count += 1;
        }
        self.total_entries = self.total_entries.saturating_sub(count);
        count
    }

    /// Drop a device node with all of its entries
    pub(crate) fn remove_device(&mut self, mac: &MacAddr) -> usize {
        let Some(mut device) = self.devices.remove(mac) else {
            return 0;
        };
        let (attrs, flows) = device.drain_all();
        let scope = Scope::Device(*mac);
        let handles = attrs
            .into_iter()
            .map(|value| EntryHandle::Attr { scope, value })
            .chain(flows.into_iter().map(|key| EntryHandle::Flow { device: *mac, key }));
        let count = self.forget(handles);
        debug!(device = %mac, removed = count, "device flushed");
        count
    }

    /// Remove everything, counters included. Returns the number of
    /// entries dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.total_entries;
        self.devices.clear();
        self.location = AttributeTrees::default();
        self.recency.clear();
        self.total_entries = 0;
        info!(removed = count, "gatekeeper cache cleared");
        count
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Running entry count (attribute + flow)
    pub fn entry_count(&self) -> usize {
        self.total_entries
    }

    /// Entry count by full traversal
    pub fn count_entries(&self) -> usize {
        self.devices.values().map(DeviceCache::entry_count).sum::<usize>() + self.location.len()
    }

    /// Number of device nodes
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Device node by address
    pub fn device(&self, mac: &MacAddr) -> Option<&DeviceCache> {
        self.devices.get(mac)
    }

    /// All device nodes, ordered by address
    pub fn devices(&self) -> impl Iterator<Item = &DeviceCache> {
        self.devices.values()
    }

    /// Location-wide attribute trees
    pub fn location_wide(&self) -> &AttributeTrees {
        &self.location
    }

    /// Capacity bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity bound. Only allowed while the cache is empty.
    pub fn set_capacity(&mut self, capacity: usize) -> CacheResult<()> {
        if self.total_entries != 0 {
            debug!(entries = self.total_entries, "capacity change refused");
            return Err(CacheError::CacheInUse(self.total_entries));
        }
        if capacity == 0 {
            return Err(CacheError::InvalidInput("capacity must be greater than 0"));
        }
        self.capacity = capacity;
        info!(capacity, "gatekeeper cache capacity set");
        Ok(())
    }

    /// TTL applied when a request carries none
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Entries evicted to make room since the last reset
    pub fn recycled_count(&self) -> u64 {
        self.recency.recycled()
    }

    /// Zero the recycled counter
    pub fn reset_recycled_count(&mut self) {
        self.recency.reset_recycled();
    }
}
