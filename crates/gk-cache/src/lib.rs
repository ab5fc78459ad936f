//! Gatekeeper Verdict Cache
//!
//! Remembers recent allow/block verdicts per device so the policy engine
//! is consulted once per hostname, URL, IP, application or 5-tuple.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    GatekeeperCache                           │
//! │                                                              │
//! │  devices: MAC ──► DeviceCache                                │
//! │                   ├─ hostname   (FQDN / HOST / SNI)          │
//! │                   ├─ url, ipv4, ipv6, app                    │
//! │                   ├─ inbound flows  (5-tuple)                │
//! │                   └─ outbound flows (5-tuple)                │
//! │                                                              │
//! │  location-wide: hostname, url, ipv4, ipv6, app               │
//! │                                                              │
//! │  recency (LRU over every entry) ──► evict when full          │
//! └──────────────────────────────────────────────────────────────┘
//!        ▲ add / lookup / delete       ▲ sweep      ▲ flush(rules)
//! ```
//!
//! [`GatekeeperCache`] is single-owner; wrap it in
//! [`SharedGatekeeperCache`] to share it between threads.

#![warn(missing_docs)]

pub mod cmp;
pub mod config;
pub mod device;
pub mod entry;
pub mod error;
pub mod flush;
pub mod manager;
pub mod recency;
pub mod request;
pub mod shared;
pub mod stats;
pub mod ttl;

pub use config::CacheConfig;
pub use device::{AttributeTrees, DeviceCache, KindCounters};
pub use entry::{AttrEntry, AttrTree, AttrValue, FlowEntry, LayerHits};
pub use error::{CacheError, CacheResult};
pub use manager::GatekeeperCache;
pub use request::{
    AddOutcome, AttributeRequest, CacheVerdict, FlowRequest, Redirect, RequestKind,
    MAX_REDIRECT_IPS,
};
pub use shared::SharedGatekeeperCache;
pub use stats::{CacheStats, KindStats};

use std::time::Duration;

/// Entry bound when the config does not set one
pub const DEFAULT_CAPACITY: usize = 100_000;

/// TTL applied to requests that carry none
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
