//! Request and response structures
//!
//! These are the whole surface the host talks to the cache through: an
//! attribute request (hostname, URL, IP, application) and a flow request
//! (5-tuple). Lookups answer with a [`CacheVerdict`].

use gk_common::{Action, FlowKey, MacAddr};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of request kinds, sized for per-kind counter arrays
pub const KIND_COUNT: usize = 9;

/// Maximum redirect addresses carried by a hostname entry
pub const MAX_REDIRECT_IPS: usize = 2;

/// Request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestKind {
    /// DNS query name
    Fqdn = 0,
    /// HTTP URL
    Url = 1,
    /// HTTP Host header
    Host = 2,
    /// TLS server name
    Sni = 3,
    /// IPv4 address
    Ipv4 = 4,
    /// IPv6 address
    Ipv6 = 5,
    /// Application name
    App = 6,
    /// Inbound 5-tuple
    Inbound = 7,
    /// Outbound 5-tuple
    Outbound = 8,
}

impl RequestKind {
    /// Every kind, in code order
    pub const ALL: [RequestKind; KIND_COUNT] = [
        Self::Fqdn,
        Self::Url,
        Self::Host,
        Self::Sni,
        Self::Ipv4,
        Self::Ipv6,
        Self::App,
        Self::Inbound,
        Self::Outbound,
    ];

    /// Decode from the host's integer request type
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Integer request type
    pub fn code(&self) -> i32 {
        *self as i32
    }

    #[inline(always)]
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// DNS redirect payload for hostname verdicts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    /// TTL handed to the DNS client
    pub ttl: Duration,
    /// Optional CNAME answer
    pub cname: Option<String>,
    /// Redirect addresses, at most [`MAX_REDIRECT_IPS`]
    pub ips: Vec<String>,
}

impl Redirect {
    /// Create a redirect, keeping the first [`MAX_REDIRECT_IPS`] addresses
    pub fn new<I, S>(ttl: Duration, cname: Option<String>, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ttl,
            cname,
            ips: ips.into_iter().take(MAX_REDIRECT_IPS).map(Into::into).collect(),
        }
    }
}

/// Attribute add/lookup/delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRequest {
    /// Device address, `None` for the location-wide tree
    pub device: Option<MacAddr>,
    /// Attribute kind
    pub kind: RequestKind,
    /// Attribute value (hostname, URL, IP literal or application name)
    pub value: String,
    /// Requested TTL, the configured default when `None`
    pub ttl: Option<Duration>,
    /// Verdict action
    pub action: Action,
    /// Rule that produced the verdict
    pub policy_id: Option<String>,
    /// Category id
    pub category_id: u32,
    /// Risk/confidence level
    pub confidence_level: u32,
    /// Whether the classifier categorized the attribute
    pub categorized: bool,
    /// Network zone label
    pub network_id: Option<String>,
    /// DNS redirect payload, hostname kinds only
    pub redirect: Option<Redirect>,
    /// Verdict of the hostname the address was resolved from, IP kinds only
    pub action_by_name: Action,
    /// Address is in a private range; its lookups are not counted
    pub private_ip: bool,
}

impl AttributeRequest {
    /// Minimal request, used as is for lookups and deletes
    pub fn new(device: Option<MacAddr>, kind: RequestKind, value: impl Into<String>) -> Self {
        Self {
            device,
            kind,
            value: value.into(),
            ttl: None,
            action: Action::Unspecified,
            policy_id: None,
            category_id: 0,
            confidence_level: 0,
            categorized: false,
            network_id: None,
            redirect: None,
            action_by_name: Action::Unspecified,
            private_ip: false,
        }
    }

    /// Set TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set action
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Set policy id
    pub fn with_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    /// Set category, marking the attribute categorized
    pub fn with_category(mut self, category_id: u32) -> Self {
        self.category_id = category_id;
        self.categorized = true;
        self
    }

    /// Set confidence level
    pub fn with_confidence(mut self, level: u32) -> Self {
        self.confidence_level = level;
        self
    }

    /// Set network zone
    pub fn with_network_id(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    /// Attach a DNS redirect
    pub fn with_redirect(mut self, redirect: Redirect) -> Self {
        self.redirect = Some(redirect);
        self
    }

    /// Set the verdict learned through name resolution
    pub fn with_action_by_name(mut self, action: Action) -> Self {
        self.action_by_name = action;
        self
    }

    /// Mark the address private
    pub fn with_private_ip(mut self, private_ip: bool) -> Self {
        self.private_ip = private_ip;
        self
    }
}

/// Flow add/lookup/delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    /// Device address, required
    pub device: Option<MacAddr>,
    /// 5-tuple and direction
    pub key: FlowKey,
    /// Requested TTL, the configured default when `None`
    pub ttl: Option<Duration>,
    /// Verdict action
    pub action: Action,
    /// Rule that produced the verdict
    pub policy_id: Option<String>,
    /// Category id
    pub category_id: u32,
    /// Risk/confidence level
    pub confidence_level: u32,
    /// Flow to or from a private address; its lookups are not counted
    pub private_ip: bool,
}

impl FlowRequest {
    /// Minimal request, used as is for lookups and deletes
    pub fn new(device: MacAddr, key: FlowKey) -> Self {
        Self {
            device: Some(device),
            key,
            ttl: None,
            action: Action::Unspecified,
            policy_id: None,
            category_id: 0,
            confidence_level: 0,
            private_ip: false,
        }
    }

    /// Set TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set action
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Set policy id
    pub fn with_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    /// Set category
    pub fn with_category(mut self, category_id: u32) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set confidence level
    pub fn with_confidence(mut self, level: u32) -> Self {
        self.confidence_level = level;
        self
    }

    /// Mark the flow private
    pub fn with_private_ip(mut self, private_ip: bool) -> Self {
        self.private_ip = private_ip;
        self
    }

    /// Request kind implied by the flow direction
    pub fn kind(&self) -> Option<RequestKind> {
        match self.key.direction {
            gk_common::FlowDirection::Inbound => Some(RequestKind::Inbound),
            gk_common::FlowDirection::Outbound => Some(RequestKind::Outbound),
            _ => None,
        }
    }
}

/// Verdict returned by a cache hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheVerdict {
    /// Stored action
    pub action: Action,
    /// Stored policy id
    pub policy_id: Option<String>,
    /// Stored category
    pub category_id: u32,
    /// Stored confidence level
    pub confidence_level: u32,
    /// Stored categorized flag
    pub categorized: bool,
    /// Hit count after this lookup
    pub hit_count: u64,
    /// Stored network zone
    pub network_id: Option<String>,
    /// Redirect payload, hostname entries only
    pub redirect: Option<Redirect>,
}

/// Result of a successful add
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new entry was created
    Inserted,
    /// An entry with the same key exists; nothing changed
    AlreadyPresent,
    /// An existing entry was refreshed by an upsert
    Refreshed,
}
