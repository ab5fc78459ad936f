//! Per-device cache node
//!
//! A device owns five attribute trees (hostname, URL, IPv4, IPv6,
//! application), two flow trees (inbound, outbound) and per-kind counters.
//! The location-wide cache reuses [`AttributeTrees`] without flows or
//! counters.

use crate::entry::{AttrEntry, AttrTree, AttrValue, FlowEntry};
use crate::request::{RequestKind, KIND_COUNT};
use gk_common::{Action, FlowDirection, FlowKey, MacAddr};
use serde::Serialize;
use std::collections::BTreeMap;

/// Ordered attribute map
pub type AttrMap = BTreeMap<AttrValue, AttrEntry>;

/// Ordered flow map
pub type FlowMap = BTreeMap<FlowKey, FlowEntry>;

/// The five attribute trees
#[derive(Debug, Default, Clone)]
pub struct AttributeTrees {
    hostname: AttrMap,
    url: AttrMap,
    ipv4: AttrMap,
    ipv6: AttrMap,
    app: AttrMap,
}

impl AttributeTrees {
    /// Tree by kind
    pub fn tree(&self, tree: AttrTree) -> &AttrMap {
        match tree {
            AttrTree::Hostname => &self.hostname,
            AttrTree::Url => &self.url,
            AttrTree::Ipv4 => &self.ipv4,
            AttrTree::Ipv6 => &self.ipv6,
            AttrTree::App => &self.app,
        }
    }

    pub(crate) fn tree_mut(&mut self, tree: AttrTree) -> &mut AttrMap {
        match tree {
            AttrTree::Hostname => &mut self.hostname,
            AttrTree::Url => &mut self.url,
            AttrTree::Ipv4 => &mut self.ipv4,
            AttrTree::Ipv6 => &mut self.ipv6,
            AttrTree::App => &mut self.app,
        }
    }

    /// Entry for a value
    pub fn get(&self, value: &AttrValue) -> Option<&AttrEntry> {
        self.tree(value.tree()).get(value)
    }

    pub(crate) fn get_mut(&mut self, value: &AttrValue) -> Option<&mut AttrEntry> {
        self.tree_mut(value.tree()).get_mut(value)
    }

    pub(crate) fn insert(&mut self, value: AttrValue, entry: AttrEntry) {
        self.tree_mut(value.tree()).insert(value, entry);
    }

    pub(crate) fn remove(&mut self, value: &AttrValue) -> Option<AttrEntry> {
        self.tree_mut(value.tree()).remove(value)
    }

    /// Entries across all five trees
    pub fn len(&self) -> usize {
        AttrTree::ALL.iter().map(|t| self.tree(*t).len()).sum()
    }

    /// True when every tree is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every entry, tree by tree
    pub fn iter(&self) -> impl Iterator<Item = (&AttrValue, &AttrEntry)> {
        AttrTree::ALL.into_iter().flat_map(move |t| self.tree(t).iter())
    }

    /// Remove the entries of one tree matching `pred`, returning their keys
    pub(crate) fn drain_where<F>(&mut self, tree: AttrTree, mut pred: F) -> Vec<AttrValue>
    where
        F: FnMut(&AttrValue, &AttrEntry) -> bool,
    {
        let mut removed = Vec::new();
        self.tree_mut(tree).retain(|value, entry| {
            if pred(value, entry) {
                removed.push(value.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove everything, returning the keys
    pub(crate) fn drain_all(&mut self) -> Vec<AttrValue> {
        let mut removed = Vec::with_capacity(self.len());
        for tree in AttrTree::ALL {
            let map = std::mem::take(self.tree_mut(tree));
            removed.extend(map.into_keys());
        }
        removed
    }
}

/// Per-kind monotonic counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindCounters {
    /// Lookups answered from the cache for this kind
    pub requests: u64,
    /// Entries added with an allow verdict
    pub allowed: u64,
    /// Entries added with any other verdict
    pub blocked: u64,
}

/// Cache node of one device
#[derive(Debug, Clone)]
pub struct DeviceCache {
    mac: MacAddr,
    pub(crate) attrs: AttributeTrees,
    pub(crate) inbound: FlowMap,
    pub(crate) outbound: FlowMap,
    counters: [KindCounters; KIND_COUNT],
}

impl DeviceCache {
    /// Empty node for a device
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            attrs: AttributeTrees::default(),
            inbound: FlowMap::new(),
            outbound: FlowMap::new(),
            counters: [KindCounters::default(); KIND_COUNT],
        }
    }

    /// Device address
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Attribute trees
    pub fn attributes(&self) -> &AttributeTrees {
        &self.attrs
    }

    /// Flow tree for a direction, `None` for directions that are never cached
    pub fn flows(&self, direction: FlowDirection) -> Option<&FlowMap> {
        match direction {
            FlowDirection::Inbound => Some(&self.inbound),
            FlowDirection::Outbound => Some(&self.outbound),
            _ => None,
        }
    }

    pub(crate) fn flows_mut(&mut self, direction: FlowDirection) -> Option<&mut FlowMap> {
        match direction {
            FlowDirection::Inbound => Some(&mut self.inbound),
            FlowDirection::Outbound => Some(&mut self.outbound),
            _ => None,
        }
    }

    /// Attribute plus flow entries held by this device
    pub fn entry_count(&self) -> usize {
        self.attrs.len() + self.inbound.len() + self.outbound.len()
    }

    /// Counters for one kind
    pub fn counters(&self, kind: RequestKind) -> KindCounters {
        self.counters[kind.index()]
    }

    /// Lookups answered from the cache for a kind
    pub fn requests(&self, kind: RequestKind) -> u64 {
        self.counters[kind.index()].requests
    }

    /// Allow verdicts added for a kind
    pub fn allowed(&self, kind: RequestKind) -> u64 {
        self.counters[kind.index()].allowed
    }

    /// Non-allow verdicts added for a kind
    pub fn blocked(&self, kind: RequestKind) -> u64 {
        self.counters[kind.index()].blocked
    }

    pub(crate) fn record_request(&mut self, kind: RequestKind) {
        self.counters[kind.index()].requests += 1;
    }

    pub(crate) fn record_add(&mut self, kind: RequestKind, action: Action) {
        let counters = &mut self.counters[kind.index()];
        if action == Action::Allow {
            counters.allowed += 1;
        } else {
            counters.blocked += 1;
        }
    }

    /// Remove the flows of one direction matching `pred`, returning their keys
    pub(crate) fn drain_flows_where<F>(&mut self, direction: FlowDirection, mut pred: F) -> Vec<FlowKey>
    where
        F: FnMut(&FlowKey, &FlowEntry) -> bool,
    {
        let mut removed = Vec::new();
        if let Some(map) = self.flows_mut(direction) {
            map.retain(|key, entry| {
                if pred(key, entry) {
                    removed.push(*key);
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    /// Remove every attribute and flow entry, keeping counters
    pub(crate) fn drain_all(&mut self) -> (Vec<AttrValue>, Vec<FlowKey>) {
        let attrs = self.attrs.drain_all();
        let mut flows: Vec<FlowKey> = std::mem::take(&mut self.inbound).into_keys().collect();
        flows.extend(std::mem::take(&mut self.outbound).into_keys());
        (attrs, flows)
    }
}
