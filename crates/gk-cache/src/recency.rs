//! Recency index for capacity eviction
//!
//! Every cached entry, attribute or flow, device-scoped or location-wide,
//! has exactly one handle here. Inserts and successful lookups move the
//! handle to the most-recent end; eviction pops the least-recent one.

use crate::entry::AttrValue;
use gk_common::{FlowKey, MacAddr};
use lru::LruCache;

/// Owner of an attribute entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A device's own trees
    Device(MacAddr),
    /// The location-wide trees
    Location,
}

impl From<Option<MacAddr>> for Scope {
    fn from(device: Option<MacAddr>) -> Self {
        device.map_or(Self::Location, Self::Device)
    }
}

/// Address of one cached entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryHandle {
    /// Attribute entry
    Attr {
        /// Owning scope
        scope: Scope,
        /// Key (the variant selects the tree)
        value: AttrValue,
    },
    /// Flow entry
    Flow {
        /// Owning device
        device: MacAddr,
        /// Key (the direction selects the tree)
        key: FlowKey,
    },
}

/// LRU ordering over entry handles
#[derive(Debug)]
pub struct RecencyIndex {
    order: LruCache<EntryHandle, ()>,
    recycled: u64,
}

impl Default for RecencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecencyIndex {
    /// Empty index
    pub fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
            recycled: 0,
        }
    }

    /// Track a new entry as most recent
    pub fn insert(&mut self, handle: EntryHandle) {
        self.order.put(handle, ());
    }

    /// Mark an entry as just used
    pub fn touch(&mut self, handle: &EntryHandle) {
        let _ = self.order.get(handle);
    }

    /// Stop tracking an entry
    pub fn remove(&mut self, handle: &EntryHandle) -> bool {
        self.order.pop(handle).is_some()
    }

    /// Take the least recently used handle, counting it as recycled
    pub fn pop_oldest(&mut self) -> Option<EntryHandle> {
        let (handle, ()) = self.order.pop_lru()?;
        self.recycled += 1;
        Some(handle)
    }

    /// Tracked handles
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries evicted to make room since the last reset
    pub fn recycled(&self) -> u64 {
        self.recycled
    }

    /// Zero the recycled counter
    pub fn reset_recycled(&mut self) {
        self.recycled = 0;
    }

    /// Forget every handle. The recycled counter is kept.
    pub fn clear(&mut self) {
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> EntryHandle {
        EntryHandle::Attr {
            scope: Scope::Location,
            value: AttrValue::App(name.to_string()),
        }
    }

    #[test]
    fn test_lru_order_follows_touch() {
        let mut index = RecencyIndex::new();
        index.insert(app("a"));
        index.insert(app("b"));
        index.insert(app("c"));

        index.touch(&app("a"));

        assert_eq!(index.pop_oldest(), Some(app("b")));
        assert_eq!(index.pop_oldest(), Some(app("c")));
        assert_eq!(index.pop_oldest(), Some(app("a")));
        assert_eq!(index.pop_oldest(), None);
        assert_eq!(index.recycled(), 3);

        index.reset_recycled();
        assert_eq!(index.recycled(), 0);
    }

    #[test]
    fn test_remove_is_not_recycling() {
        let mut index = RecencyIndex::new();
        index.insert(app("a"));
        assert!(index.remove(&app("a")));
        assert!(!index.remove(&app("a")));
        assert!(index.is_empty());
        assert_eq!(index.recycled(), 0);
    }

    #[test]
    fn test_scope_from_device() {
        assert_eq!(Scope::from(None), Scope::Location);
        let mac = MacAddr::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(Scope::from(Some(mac)), Scope::Device(mac));
    }
}
