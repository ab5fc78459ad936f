//! TTL sweeper
//!
//! Full scan over every device, every attribute tree and both flow trees,
//! plus the location-wide trees. Meant for a coarse periodic timer, never
//! the per-packet path.

use crate::entry::AttrTree;
use crate::manager::GatekeeperCache;
use crate::recency::{EntryHandle, Scope};
use gk_common::FlowDirection;
use tracing::debug;

impl GatekeeperCache {
    /// Remove every entry whose TTL has elapsed. Returns the number removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.now();
        let mut expired = Vec::new();

        for (mac, device) in self.devices.iter_mut() {
            let scope = Scope::Device(*mac);
            for tree in AttrTree::ALL {
                let values = device.attrs.drain_where(tree, |_, entry| entry.is_expired(now));
                expired.extend(values.into_iter().map(|value| EntryHandle::Attr { scope, value }));
            }
            for direction in [FlowDirection::Inbound, FlowDirection::Outbound] {
                let keys = device.drain_flows_where(direction, |_, entry| entry.is_expired(now));
                expired.extend(keys.into_iter().map(|key| EntryHandle::Flow { device: *mac, key }));
            }
        }

        for tree in AttrTree::ALL {
            let values = self.location.drain_where(tree, |_, entry| entry.is_expired(now));
            expired.extend(values.into_iter().map(|value| EntryHandle::Attr {
                scope: Scope::Location,
                value,
            }));
        }

        let removed = self.forget(expired);
        debug!(removed, remaining = self.entry_count(), "ttl sweep");
        removed
    }
}
