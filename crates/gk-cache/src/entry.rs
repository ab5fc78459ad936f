//! Cached verdict records

use crate::error::CacheError;
use crate::request::{AttributeRequest, CacheVerdict, FlowRequest, Redirect, RequestKind};
use gk_common::{Action, Timestamp};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Attribute sub-tree of a device (or of the location-wide cache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrTree {
    /// Shared by FQDN, HOST and SNI
    Hostname,
    /// URLs
    Url,
    /// IPv4 addresses
    Ipv4,
    /// IPv6 addresses
    Ipv6,
    /// Application names
    App,
}

impl AttrTree {
    /// All attribute trees
    pub const ALL: [AttrTree; 5] = [Self::Hostname, Self::Url, Self::Ipv4, Self::Ipv6, Self::App];
}

/// Attribute value, the key of an attribute entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttrValue {
    /// FQDN, HOST or SNI
    Hostname(String),
    /// URL
    Url(String),
    /// IPv4 address
    Ipv4(Ipv4Addr),
    /// IPv6 address
    Ipv6(Ipv6Addr),
    /// Application name
    App(String),
}

impl AttrValue {
    /// Build the key for a request kind from its raw string value
    pub fn parse(kind: RequestKind, raw: &str) -> Result<Self, CacheError> {
        if raw.is_empty() {
            return Err(CacheError::InvalidInput("empty attribute value"));
        }

        let value = match kind {
            RequestKind::Fqdn | RequestKind::Host | RequestKind::Sni => {
                Self::Hostname(raw.to_string())
            }
            RequestKind::Url => Self::Url(raw.to_string()),
            RequestKind::App => Self::App(raw.to_string()),
            RequestKind::Ipv4 => Self::Ipv4(
                raw.parse()
                    .map_err(|_| CacheError::InvalidInput("malformed IPv4 address"))?,
            ),
            RequestKind::Ipv6 => Self::Ipv6(
                raw.parse()
                    .map_err(|_| CacheError::InvalidInput("malformed IPv6 address"))?,
            ),
            RequestKind::Inbound | RequestKind::Outbound => {
                return Err(CacheError::UnsupportedKind(kind))
            }
        };
        Ok(value)
    }

    /// Sub-tree holding this value
    pub fn tree(&self) -> AttrTree {
        match self {
            Self::Hostname(_) => AttrTree::Hostname,
            Self::Url(_) => AttrTree::Url,
            Self::Ipv4(_) => AttrTree::Ipv4,
            Self::Ipv6(_) => AttrTree::Ipv6,
            Self::App(_) => AttrTree::App,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hostname(s) | Self::Url(s) | Self::App(s) => f.write_str(s),
            Self::Ipv4(ip) => write!(f, "{ip}"),
            Self::Ipv6(ip) => write!(f, "{ip}"),
        }
    }
}

/// Per-protocol-layer hit counters of a hostname entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerHits {
    /// Hits through DNS
    pub fqdn: u64,
    /// Hits through HTTP Host
    pub host: u64,
    /// Hits through TLS SNI
    pub sni: u64,
}

impl LayerHits {
    fn bump(&mut self, kind: RequestKind) {
        match kind {
            RequestKind::Fqdn => self.fqdn += 1,
            RequestKind::Host => self.host += 1,
            RequestKind::Sni => self.sni += 1,
            _ => {}
        }
    }
}

/// Cached verdict for one attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrEntry {
    /// Expiry window
    pub ttl: Duration,
    /// Creation (or last refresh) time
    pub created_at: Timestamp,
    /// Verdict action
    pub action: Action,
    /// Rule that produced the verdict
    pub policy_id: Option<String>,
    /// Category id
    pub category_id: u32,
    /// Risk/confidence level
    pub confidence_level: u32,
    /// Categorized flag
    pub categorized: bool,
    /// Counted lookups
    pub hit_count: u64,
    /// Counted lookups split by protocol layer, hostname entries only
    pub layer_hits: LayerHits,
    /// Network zone label
    pub network_id: Option<String>,
    /// DNS redirect payload, hostname entries only
    pub redirect: Option<Redirect>,
    /// Verdict of the hostname the address was resolved from, IP entries only
    pub action_by_name: Action,
    /// Private address, lookups leave `hit_count` alone
    pub private_ip: bool,
}

impl AttrEntry {
    pub(crate) fn from_request(
        req: &AttributeRequest,
        tree: AttrTree,
        ttl: Duration,
        now: Timestamp,
    ) -> Self {
        let redirect = match tree {
            AttrTree::Hostname => req.redirect.clone(),
            _ => None,
        };
        let action_by_name = match tree {
            AttrTree::Ipv4 | AttrTree::Ipv6 => req.action_by_name,
            _ => Action::Unspecified,
        };
        Self {
            ttl,
            created_at: now,
            action: req.action,
            policy_id: req.policy_id.clone(),
            category_id: req.category_id,
            confidence_level: req.confidence_level,
            categorized: req.categorized,
            hit_count: 0,
            layer_hits: LayerHits::default(),
            network_id: req.network_id.clone(),
            redirect,
            action_by_name,
            private_ip: req.private_ip,
        }
    }

    /// Expired once `now - created_at >= ttl`
    #[inline(always)]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_since(self.created_at) >= self.ttl
    }

    /// Overwrite verdict fields from a newer classification
    pub(crate) fn refresh(
        &mut self,
        req: &AttributeRequest,
        tree: AttrTree,
        ttl: Duration,
        now: Timestamp,
    ) {
        if req.action != Action::Unspecified {
            self.action = req.action;
        }
        if req.policy_id.is_some() {
            self.policy_id = req.policy_id.clone();
        }
        if req.network_id.is_some() {
            self.network_id = req.network_id.clone();
        }
        if req.redirect.is_some() && tree == AttrTree::Hostname {
            self.redirect = req.redirect.clone();
        }
        if req.action_by_name != Action::Unspecified && matches!(tree, AttrTree::Ipv4 | AttrTree::Ipv6) {
            self.action_by_name = req.action_by_name;
        }
        self.private_ip = req.private_ip;
        self.category_id = req.category_id;
        self.confidence_level = req.confidence_level;
        self.categorized = req.categorized;
        self.ttl = ttl;
        self.created_at = now;
    }

    /// Count one lookup. Private addresses are not counted.
    pub(crate) fn record_hit(&mut self, kind: RequestKind) {
        if self.private_ip {
            return;
        }
        self.hit_count += 1;
        self.layer_hits.bump(kind);
    }

    /// Fold the name verdict into the entry's own action
    ///
    /// An address whose hostname was allowed takes the allow verdict when
    /// it has none of its own. One whose hostname was blocked and that has
    /// no verdict of its own cannot be answered, so this returns false.
    pub(crate) fn resolve_action_by_name(&mut self) -> bool {
        match (self.action_by_name, self.action) {
            (Action::Block, Action::Unspecified) => false,
            (Action::Allow, Action::Unspecified) => {
                self.action = Action::Allow;
                true
            }
            _ => true,
        }
    }

    /// Verdict as seen through a lookup of `kind`
    pub(crate) fn verdict(&self, kind: RequestKind) -> CacheVerdict {
        let mut verdict = CacheVerdict {
            action: self.action,
            policy_id: self.policy_id.clone(),
            category_id: self.category_id,
            confidence_level: self.confidence_level,
            categorized: self.categorized,
            hit_count: self.hit_count,
            network_id: self.network_id.clone(),
            redirect: self.redirect.clone(),
        };

        // TLS cannot be answered with a DNS redirect.
        if kind == RequestKind::Sni && verdict.action == Action::Redirect {
            verdict.action = Action::Block;
            verdict.redirect = None;
        }
        verdict
    }
}

/// Cached verdict for one 5-tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// Expiry window
    pub ttl: Duration,
    /// Creation time
    pub created_at: Timestamp,
    /// Verdict action
    pub action: Action,
    /// Rule that produced the verdict
    pub policy_id: Option<String>,
    /// Category id
    pub category_id: u32,
    /// Risk/confidence level
    pub confidence_level: u32,
    /// Counted lookups
    pub hit_count: u64,
    /// Private flow, lookups leave `hit_count` alone
    pub private_ip: bool,
}

impl FlowEntry {
    pub(crate) fn from_request(req: &FlowRequest, ttl: Duration, now: Timestamp) -> Self {
        Self {
            ttl,
            created_at: now,
            action: req.action,
            policy_id: req.policy_id.clone(),
            category_id: req.category_id,
            confidence_level: req.confidence_level,
            hit_count: 0,
            private_ip: req.private_ip,
        }
    }

    /// Expired once `now - created_at >= ttl`
    #[inline(always)]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_since(self.created_at) >= self.ttl
    }

    /// Count one lookup. Private flows are not counted.
    pub(crate) fn record_hit(&mut self) {
        if !self.private_ip {
            self.hit_count += 1;
        }
    }

    pub(crate) fn verdict(&self) -> CacheVerdict {
        CacheVerdict {
            action: self.action,
            policy_id: self.policy_id.clone(),
            category_id: self.category_id,
            confidence_level: self.confidence_level,
            categorized: false,
            hit_count: self.hit_count,
            network_id: None,
            redirect: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_kinds_share_key() {
        let a = AttrValue::parse(RequestKind::Fqdn, "www.example.com").unwrap();
        let b = AttrValue::parse(RequestKind::Sni, "www.example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tree(), AttrTree::Hostname);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert_eq!(
            AttrValue::parse(RequestKind::Url, ""),
            Err(CacheError::InvalidInput("empty attribute value"))
        );
        assert!(AttrValue::parse(RequestKind::Ipv4, "::1").is_err());
        assert!(AttrValue::parse(RequestKind::Ipv6, "1.2.3.4").is_err());
        assert_eq!(
            AttrValue::parse(RequestKind::Inbound, "x"),
            Err(CacheError::UnsupportedKind(RequestKind::Inbound))
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let req = AttributeRequest::new(None, RequestKind::App, "netflix");
        let entry = AttrEntry::from_request(&req, AttrTree::App, Duration::from_secs(2), Timestamp::from_secs(10));

        assert!(!entry.is_expired(Timestamp::from_secs(11)));
        assert!(entry.is_expired(Timestamp::from_secs(12)));
        assert!(!entry.is_expired(Timestamp::from_secs(5)));
    }

    #[test]
    fn test_sni_redirect_reported_as_block() {
        let req = AttributeRequest::new(None, RequestKind::Fqdn, "ads.example.com")
            .with_action(Action::Redirect)
            .with_redirect(Redirect::new(Duration::from_secs(30), None, ["10.0.0.1"]));
        let entry = AttrEntry::from_request(&req, AttrTree::Hostname, Duration::from_secs(60), Timestamp::from_secs(0));

        let dns = entry.verdict(RequestKind::Fqdn);
        assert_eq!(dns.action, Action::Redirect);
        assert!(dns.redirect.is_some());

        let tls = entry.verdict(RequestKind::Sni);
        assert_eq!(tls.action, Action::Block);
        assert!(tls.redirect.is_none());
    }

    #[test]
    fn test_layer_hits() {
        let req = AttributeRequest::new(None, RequestKind::Host, "a.example");
        let mut entry = AttrEntry::from_request(&req, AttrTree::Hostname, Duration::from_secs(60), Timestamp::from_secs(0));
        entry.record_hit(RequestKind::Host);
        entry.record_hit(RequestKind::Sni);
        entry.record_hit(RequestKind::Sni);

        assert_eq!(entry.hit_count, 3);
        assert_eq!(entry.layer_hits, LayerHits { fqdn: 0, host: 1, sni: 2 });
    }

    #[test]
    fn test_private_entries_not_counted() {
        let req = AttributeRequest::new(None, RequestKind::Ipv4, "192.168.1.20").with_private_ip(true);
        let mut entry = AttrEntry::from_request(&req, AttrTree::Ipv4, Duration::from_secs(60), Timestamp::from_secs(0));
        entry.record_hit(RequestKind::Ipv4);
        assert_eq!(entry.hit_count, 0);

        let key = gk_common::FlowKey::from_v4(
            std::net::Ipv4Addr::new(192, 168, 1, 20),
            std::net::Ipv4Addr::new(192, 168, 1, 1),
            40000,
            53,
            17,
            gk_common::FlowDirection::Outbound,
        );
        let flow = FlowRequest::new(gk_common::MacAddr::default(), key).with_private_ip(true);
        let mut entry = FlowEntry::from_request(&flow, Duration::from_secs(60), Timestamp::from_secs(0));
        entry.record_hit();
        assert_eq!(entry.hit_count, 0);
    }

    #[test]
    fn test_action_by_name_resolution() {
        let at = |by_name: Action, action: Action| {
            let req = AttributeRequest::new(None, RequestKind::Ipv6, "2001:db8::7")
                .with_action(action)
                .with_action_by_name(by_name);
            AttrEntry::from_request(&req, AttrTree::Ipv6, Duration::from_secs(60), Timestamp::from_secs(0))
        };

        let mut entry = at(Action::Block, Action::Unspecified);
        assert!(!entry.resolve_action_by_name());

        let mut entry = at(Action::Block, Action::Allow);
        assert!(entry.resolve_action_by_name());
        assert_eq!(entry.action, Action::Allow);

        let mut entry = at(Action::Allow, Action::Unspecified);
        assert!(entry.resolve_action_by_name());
        assert_eq!(entry.action, Action::Allow);

        let mut entry = at(Action::Unspecified, Action::Block);
        assert!(entry.resolve_action_by_name());
        assert_eq!(entry.action, Action::Block);

        // Only IP entries remember the name verdict.
        let req = AttributeRequest::new(None, RequestKind::App, "zoom").with_action_by_name(Action::Block);
        let entry = AttrEntry::from_request(&req, AttrTree::App, Duration::from_secs(60), Timestamp::from_secs(0));
        assert_eq!(entry.action_by_name, Action::Unspecified);
    }
}
