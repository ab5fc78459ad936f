//! Cache statistics and debug dump

use crate::device::{AttributeTrees, DeviceCache};
use crate::entry::AttrTree;
use crate::manager::GatekeeperCache;
use crate::request::RequestKind;
use gk_common::{FlowDirection, MacAddr, Timestamp};
use serde::Serialize;
use tracing::{trace, Level};

/// Per-kind totals summed over all devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Request kind
    pub kind: RequestKind,
    /// Lookups answered from the cache
    pub requests: u64,
    /// Entries added with an allow verdict
    pub allowed: u64,
    /// Entries added with any other verdict
    pub blocked: u64,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cached entries, attribute and flow
    pub entries: usize,
    /// Capacity bound
    pub capacity: usize,
    /// Device nodes
    pub devices: usize,
    /// Entries in the location-wide trees
    pub location_entries: usize,
    /// Entries evicted to make room
    pub recycled: u64,
    /// Per-kind totals in code order
    pub kinds: Vec<KindStats>,
}

impl CacheStats {
    /// Totals for one kind
    pub fn kind(&self, kind: RequestKind) -> Option<&KindStats> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl GatekeeperCache {
    /// Take a statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let kinds = RequestKind::ALL
            .into_iter()
            .map(|kind| {
                let mut totals = KindStats {
                    kind,
                    requests: 0,
                    allowed: 0,
                    blocked: 0,
                };
                for device in self.devices.values() {
                    let counters = device.counters(kind);
                    totals.requests += counters.requests;
                    totals.allowed += counters.allowed;
                    totals.blocked += counters.blocked;
                }
                totals
            })
            .collect();

        CacheStats {
            entries: self.entry_count(),
            capacity: self.capacity(),
            devices: self.device_count(),
            location_entries: self.location.len(),
            recycled: self.recycled_count(),
            kinds,
        }
    }

    /// Emit every cached entry as `trace` events
    ///
    /// Restricted to one device when `device` is given (the location-wide
    /// trees are then skipped). Does nothing unless TRACE is enabled.
    /// Returns the number of entries written.
    pub fn dump_entries(&self, device: Option<&MacAddr>) -> usize {
        if !tracing::enabled!(Level::TRACE) {
            return 0;
        }
        let now = self.now();
        let mut dumped = 0;

        trace!(entries = self.entry_count(), capacity = self.capacity(), "cache dump begin");
        match device {
            Some(mac) => {
                if let Some(node) = self.devices.get(mac) {
                    dumped += dump_device(node, now);
                }
            }
            None => {
                for node in self.devices.values() {
                    dumped += dump_device(node, now);
                }
                trace!(entries = self.location.len(), "location-wide");
                dumped += dump_trees(&self.location, now);
            }
        }
        trace!(dumped, "cache dump end");
        dumped
    }
}

fn dump_device(node: &DeviceCache, now: Timestamp) -> usize {
    let mac = node.mac();
    trace!(device = %mac, entries = node.entry_count(), "device");
    for kind in RequestKind::ALL {
        let c = node.counters(kind);
        if c.requests + c.allowed + c.blocked > 0 {
            trace!(
                device = %mac,
                kind = ?kind,
                requests = c.requests,
                allowed = c.allowed,
                blocked = c.blocked,
                "counters"
            );
        }
    }

    let mut dumped = dump_trees(node.attributes(), now);
    for direction in [FlowDirection::Inbound, FlowDirection::Outbound] {
        let Some(flows) = node.flows(direction) else {
            continue;
        };
        trace!(device = %mac, direction = ?direction, entries = flows.len(), "flows");
        for (key, entry) in flows {
            trace!(
                flow = %key,
                action = ?entry.action,
                policy = ?entry.policy_id,
                hits = entry.hit_count,
                age = ?now.saturating_since(entry.created_at),
                ttl = ?entry.ttl,
                "flow entry"
            );
            dumped += 1;
        }
    }
    dumped
}

fn dump_trees(trees: &AttributeTrees, now: Timestamp) -> usize {
    let mut dumped = 0;
    for tree in AttrTree::ALL {
        let map = trees.tree(tree);
        if map.is_empty() {
            continue;
        }
        trace!(tree = ?tree, entries = map.len(), "attributes");
        for (value, entry) in map {
            trace!(
                value = %value,
                action = ?entry.action,
                policy = ?entry.policy_id,
                category = entry.category_id,
                confidence = entry.confidence_level,
                hits = entry.hit_count,
                age = ?now.saturating_since(entry.created_at),
                ttl = ?entry.ttl,
                "attribute entry"
            );
            dumped += 1;
        }
    }
    dumped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{AttributeRequest, FlowRequest};
    use gk_common::{Action, FlowKey};
    use std::net::Ipv4Addr;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }

    fn populated() -> GatekeeperCache {
        let mut cache = GatekeeperCache::default();
        cache
            .add_attribute(
                &AttributeRequest::new(Some(mac(1)), RequestKind::Fqdn, "a.example").with_action(Action::Allow),
            )
            .unwrap();
        cache
            .add_attribute(
                &AttributeRequest::new(Some(mac(2)), RequestKind::Fqdn, "b.example").with_action(Action::Block),
            )
            .unwrap();
        cache
            .add_attribute(&AttributeRequest::new(None, RequestKind::App, "zoom"))
            .unwrap();
        let key = FlowKey::from_v4(
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
            5000,
            22,
            6,
            FlowDirection::Inbound,
        );
        cache
            .add_flow(&FlowRequest::new(mac(2), key).with_action(Action::Allow))
            .unwrap();
        cache
    }

    #[test]
    fn test_stats_snapshot() {
        let mut cache = populated();
        let lookup = AttributeRequest::new(Some(mac(1)), RequestKind::Fqdn, "a.example");
        cache.lookup_attribute(&lookup, true);
        cache.lookup_attribute(&lookup, true);
        let absent = AttributeRequest::new(Some(mac(1)), RequestKind::Fqdn, "absent.example");
        cache.lookup_attribute(&absent, true);

        let stats = cache.stats();
        assert_eq!(stats.entries, 4);
        assert_eq!(stats.devices, 2);
        assert_eq!(stats.location_entries, 1);
        assert_eq!(stats.recycled, 0);
        assert_eq!(stats.kinds.len(), RequestKind::ALL.len());

        let fqdn = stats.kind(RequestKind::Fqdn).unwrap();
        assert_eq!((fqdn.requests, fqdn.allowed, fqdn.blocked), (2, 1, 1));
        let inbound = stats.kind(RequestKind::Inbound).unwrap();
        assert_eq!((inbound.requests, inbound.allowed, inbound.blocked), (0, 1, 0));
    }

    #[test]
    fn test_stats_json() {
        let json = populated().stats().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"], 4);
        assert_eq!(value["kinds"][0]["kind"], "Fqdn");
    }

    #[test]
    fn test_dump_skipped_without_trace() {
        let cache = populated();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(cache.dump_entries(None), 0);
        });
    }

    #[test]
    fn test_dump_entries() {
        let cache = populated();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(cache.dump_entries(None), 4);
            assert_eq!(cache.dump_entries(Some(&mac(2))), 2);
            assert_eq!(cache.dump_entries(Some(&mac(9))), 0);
        });
    }
}
