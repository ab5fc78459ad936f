//! Rule-based flush engine
//!
//! A [`FlushRules`] set selects devices by MAC (or all devices plus the
//! location-wide trees when there is no MAC rule), then removes entries
//! that pass the risk/category gate and the hostname, application or IP
//! filter. A selected device with no attribute filter is dropped whole.
//!
//! For every filter the delete decision starts at "is this an OUT
//! operator" and flips on the first value that matches.

use crate::cmp::{
    app_comparator, category_comparator, hostname_comparator, ip_comparator, mac_comparator,
    risk_comparator, CategoryComparator, RiskComparator,
};
use crate::device::AttributeTrees;
use crate::entry::{AttrEntry, AttrTree, AttrValue};
use crate::manager::GatekeeperCache;
use crate::recency::{EntryHandle, Scope};
use gk_common::{FlushRules, MacAddr, SetOp};
use std::net::IpAddr;
use tracing::{debug, info};

/// Rule set with comparators resolved and IP literals split by family
struct FlushPlan<'a> {
    rules: &'a FlushRules,
    risk: RiskComparator,
    risk_level: u32,
    category: CategoryComparator,
    categories: &'a [u32],
    ipv4: Vec<IpAddr>,
    ipv6: Vec<IpAddr>,
}

impl<'a> FlushPlan<'a> {
    fn new(rules: &'a FlushRules) -> Self {
        let (risk, risk_level) = match &rules.risk {
            Some(rule) => (risk_comparator(rule.op), rule.level),
            None => (risk_comparator(None), 0),
        };
        let (category, categories) = match &rules.category {
            Some(rule) => (category_comparator(rule.op), rule.values.as_slice()),
            None => (category_comparator(None), &[][..]),
        };

        let mut ipv4 = Vec::new();
        let mut ipv6 = Vec::new();
        if let Some(rule) = &rules.ip {
            for literal in &rule.values {
                match literal.parse::<IpAddr>() {
                    Ok(addr @ IpAddr::V4(_)) => ipv4.push(addr),
                    Ok(addr @ IpAddr::V6(_)) => ipv6.push(addr),
                    Err(_) => debug!(literal = %literal, "ignoring unparseable IP in flush rule"),
                }
            }
        }

        Self {
            rules,
            risk,
            risk_level,
            category,
            categories,
            ipv4,
            ipv6,
        }
    }

    #[inline(always)]
    fn gate(&self, entry: &AttrEntry) -> bool {
        (self.risk)(entry.confidence_level, self.risk_level)
            && (self.category)(entry.category_id, self.categories)
    }

    /// Remove matching entries of one tree. `matches` tells whether a
    /// cached value matches any value of the rule.
    fn flush_tree<F>(
        &self,
        trees: &mut AttributeTrees,
        tree: AttrTree,
        out_set: bool,
        matches: F,
    ) -> Vec<AttrValue>
    where
        F: Fn(&AttrValue) -> bool,
    {
        trees.drain_where(tree, |value, entry| {
            if !self.gate(entry) {
                return false;
            }
            matches(value) != out_set
        })
    }

    /// Apply the hostname, application and IP filters to a set of trees
    fn flush_trees(&self, trees: &mut AttributeTrees) -> Vec<AttrValue> {
        let mut removed = Vec::new();

        if let Some(rule) = &self.rules.fqdn {
            let cmp = hostname_comparator(rule.op);
            let out_set = rule.op.is_some_and(|op| op.is_out());
            removed.extend(self.flush_tree(trees, AttrTree::Hostname, out_set, |value| {
                match value {
                    AttrValue::Hostname(name) => rule.values.iter().any(|p| cmp(name, p)),
                    _ => false,
                }
            }));
        }

        if let Some(rule) = &self.rules.app {
            let cmp = app_comparator(rule.op);
            let out_set = rule.op.is_some_and(|op| op.is_out());
            removed.extend(self.flush_tree(trees, AttrTree::App, out_set, |value| match value {
                AttrValue::App(name) => rule.values.iter().any(|a| cmp(name, a)),
                _ => false,
            }));
        }

        if let Some(rule) = &self.rules.ip {
            let cmp = ip_comparator(rule.op);
            let out_set = rule.op.is_some_and(|op| op.is_out());
            removed.extend(self.flush_tree(trees, AttrTree::Ipv4, out_set, |value| match value {
                AttrValue::Ipv4(addr) => {
                    let addr = IpAddr::V4(*addr);
                    self.ipv4.iter().any(|ip| cmp(&addr, ip))
                }
                _ => false,
            }));
            removed.extend(self.flush_tree(trees, AttrTree::Ipv6, out_set, |value| match value {
                AttrValue::Ipv6(addr) => {
                    let addr = IpAddr::V6(*addr);
                    self.ipv6.iter().any(|ip| cmp(&addr, ip))
                }
                _ => false,
            }));
        }

        removed
    }
}

impl GatekeeperCache {
    /// Remove every entry selected by `rules`. Returns the number removed.
    pub fn flush_rules(&mut self, rules: &FlushRules) -> usize {
        let plan = FlushPlan::new(rules);

        let removed = match &rules.mac {
            None => {
                let macs: Vec<MacAddr> = self.devices.keys().copied().collect();
                let mut total = 0;
                for mac in macs {
                    total += self.flush_device(&mac, &plan);
                }
                total + self.flush_location(&plan)
            }
            Some(rule) => {
                let cmp = mac_comparator(rule.op);
                let out_set = rule.op.is_some_and(|op: SetOp| op.is_out());
                let targets: Vec<MacAddr> = rule
                    .values
                    .iter()
                    .filter_map(|s| match s.parse() {
                        Ok(mac) => Some(mac),
                        Err(e) => {
                            debug!(error = %e, "skipping invalid MAC in flush rule");
                            None
                        }
                    })
                    .collect();

                let selected: Vec<MacAddr> = self
                    .devices
                    .keys()
                    .filter(|&&mac| targets.iter().any(|t| cmp(&mac, t)) != out_set)
                    .copied()
                    .collect();

                let whole_device = !rules.has_attribute_filter();
                let mut total = 0;
                for mac in selected {
                    total += if whole_device {
                        self.remove_device(&mac)
                    } else {
                        self.flush_device(&mac, &plan)
                    };
                }
                total
            }
        };

        info!(removed, remaining = self.entry_count(), "flush rules applied");
        removed
    }

    /// Without a MAC rule, drop the whole cache. Otherwise same as
    /// [`flush_rules`](Self::flush_rules).
    pub fn flush_all(&mut self, rules: &FlushRules) -> usize {
        if rules.mac.is_none() {
            return self.clear();
        }
        self.flush_rules(rules)
    }

    fn flush_device(&mut self, mac: &MacAddr, plan: &FlushPlan<'_>) -> usize {
        let Some(device) = self.devices.get_mut(mac) else {
            return 0;
        };
        let values = plan.flush_trees(&mut device.attrs);
        let scope = Scope::Device(*mac);
        self.forget(values.into_iter().map(|value| EntryHandle::Attr { scope, value }))
    }

    fn flush_location(&mut self, plan: &FlushPlan<'_>) -> usize {
        let values = plan.flush_trees(&mut self.location);
        self.forget(values.into_iter().map(|value| EntryHandle::Attr {
            scope: Scope::Location,
            value,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CacheConfig;
    use crate::manager::GatekeeperCache;
    use crate::request::{AttributeRequest, FlowRequest, RequestKind};
    use gk_common::{FlowDirection, FlowKey, FlushRules, FqdnOp, MacAddr, RiskOp, SetOp};
    use std::net::Ipv4Addr;

    const DEV1: &str = "AA:AA:AA:AA:AA:01";
    const DEV2: &str = "AA:AA:AA:AA:AA:02";
    const DEV3: &str = "AA:AA:AA:AA:AA:03";

    fn mac(s: &str) -> MacAddr {
        s.parse().unwrap()
    }

    fn hostname(cache: &mut GatekeeperCache, device: &str, name: &str) {
        cache
            .add_attribute(&AttributeRequest::new(Some(mac(device)), RequestKind::Fqdn, name))
            .unwrap();
    }

    fn has_hostname(cache: &mut GatekeeperCache, device: &str, name: &str) -> bool {
        cache
            .lookup_attribute(&AttributeRequest::new(Some(mac(device)), RequestKind::Host, name), false)
            .is_some()
    }

    fn three_devices() -> GatekeeperCache {
        let mut cache = GatekeeperCache::new(CacheConfig::default());
        hostname(&mut cache, DEV1, "www.test.com");
        hostname(&mut cache, DEV2, "www.entr2.com");
        hostname(&mut cache, DEV3, "www.entr3.com");
        cache
    }

    #[test]
    fn test_flush_mac_in_fqdn_in() {
        let mut cache = three_devices();
        let rules = FlushRules::new()
            .with_macs(SetOp::In, [DEV3])
            .with_fqdns(FqdnOp::In, ["www.entr3.com"]);

        assert_eq!(cache.flush_rules(&rules), 1);
        assert_eq!(cache.entry_count(), 2);
        assert!(has_hostname(&mut cache, DEV1, "www.test.com"));
        assert!(has_hostname(&mut cache, DEV2, "www.entr2.com"));
        assert!(!has_hostname(&mut cache, DEV3, "www.entr3.com"));
    }

    #[test]
    fn test_flush_fqdn_out_deletes_non_matching() {
        let mut cache = three_devices();
        let rules = FlushRules::new()
            .with_macs(SetOp::In, [DEV3])
            .with_fqdns(FqdnOp::Out, ["not-present.example"]);

        assert_eq!(cache.flush_rules(&rules), 1);
        assert!(!has_hostname(&mut cache, DEV3, "www.entr3.com"));
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_flush_fqdn_out_keeps_matching() {
        let mut cache = three_devices();
        let rules = FlushRules::new()
            .with_macs(SetOp::In, [DEV3])
            .with_fqdns(FqdnOp::Out, ["www.entr3.com"]);

        assert_eq!(cache.flush_rules(&rules), 0);
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn test_flush_mac_out_selects_other_devices() {
        let mut cache = three_devices();
        let rules = FlushRules::new()
            .with_macs(SetOp::Out, [DEV3])
            .with_fqdns(FqdnOp::SuffixIn, [".com"]);

        assert_eq!(cache.flush_rules(&rules), 2);
        assert!(has_hostname(&mut cache, DEV3, "www.entr3.com"));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_full_device_flush() {
        let mut cache = three_devices();
        let dev = mac(DEV3);
        cache
            .add_attribute(&AttributeRequest::new(Some(dev), RequestKind::App, "zoom"))
            .unwrap();
        cache
            .add_attribute(&AttributeRequest::new(Some(dev), RequestKind::Ipv4, "192.0.2.1"))
            .unwrap();
        let key = FlowKey::from_v4(
            Ipv4Addr::new(192, 168, 1, 3),
            Ipv4Addr::new(192, 0, 2, 1),
            3333,
            443,
            6,
            FlowDirection::Outbound,
        );
        cache.add_flow(&FlowRequest::new(dev, key)).unwrap();
        cache
            .add_flow(&FlowRequest::new(dev, FlowKey { direction: FlowDirection::Inbound, ..key }))
            .unwrap();
        assert_eq!(cache.entry_count(), 7);

        let rules = FlushRules::new().with_macs(SetOp::In, [DEV3]);
        assert_eq!(cache.flush_rules(&rules), 5);
        assert!(cache.device(&dev).is_none());
        assert_eq!(cache.entry_count(), 2);
        assert_eq!(cache.count_entries(), 2);
    }

    #[test]
    fn test_flush_mac_out_drops_other_devices_whole() {
        let mut cache = three_devices();
        let key = FlowKey::from_v4(
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 0, 2, 9),
            4000,
            443,
            6,
            FlowDirection::Outbound,
        );
        cache.add_flow(&FlowRequest::new(mac(DEV1), key)).unwrap();
        cache.add_flow(&FlowRequest::new(mac(DEV3), key)).unwrap();
        cache
            .add_attribute(&AttributeRequest::new(Some(mac(DEV2)), RequestKind::App, "zoom"))
            .unwrap();
        assert_eq!(cache.entry_count(), 6);

        let rules = FlushRules::new().with_macs(SetOp::Out, [DEV3]);
        assert_eq!(cache.flush_rules(&rules), 4);
        assert!(cache.device(&mac(DEV1)).is_none());
        assert!(cache.device(&mac(DEV2)).is_none());
        assert!(has_hostname(&mut cache, DEV3, "www.entr3.com"));
        assert!(cache.lookup_flow(&FlowRequest::new(mac(DEV3), key), false).is_some());
        assert_eq!(cache.entry_count(), 2);
        assert_eq!(cache.count_entries(), 2);
    }

    #[test]
    fn test_flush_hostname_out_operators() {
        let cases = [
            (FqdnOp::SuffixOut, ".test.com"),
            (FqdnOp::PrefixOut, "www.test"),
            (FqdnOp::WildcardOut, "*.test.com"),
        ];
        for (op, pattern) in cases {
            let mut cache = three_devices();
            let rules = FlushRules::new().with_fqdns(op, [pattern]);

            assert_eq!(cache.flush_rules(&rules), 2, "{op:?}");
            assert!(has_hostname(&mut cache, DEV1, "www.test.com"), "{op:?}");
            assert!(!has_hostname(&mut cache, DEV2, "www.entr2.com"), "{op:?}");
            assert!(!has_hostname(&mut cache, DEV3, "www.entr3.com"), "{op:?}");
            assert_eq!(cache.entry_count(), 1);
        }
    }

    #[test]
    fn test_flush_without_mac_rule_hits_all_devices_and_location() {
        let mut cache = three_devices();
        cache
            .add_attribute(&AttributeRequest::new(None, RequestKind::Sni, "www.entr2.com"))
            .unwrap();

        let rules = FlushRules::new().with_fqdns(FqdnOp::PrefixIn, ["www.entr"]);
        assert_eq!(cache.flush_rules(&rules), 3);
        assert!(has_hostname(&mut cache, DEV1, "www.test.com"));
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.location_wide().is_empty());
    }

    #[test]
    fn test_flush_without_any_rule_removes_nothing() {
        let mut cache = three_devices();
        assert_eq!(cache.flush_rules(&FlushRules::new()), 0);
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn test_flush_wildcard() {
        let mut cache = three_devices();
        hostname(&mut cache, DEV1, "ads.tracker.example");
        hostname(&mut cache, DEV1, "cdn.tracker.example");

        let rules = FlushRules::new().with_fqdns(FqdnOp::WildcardIn, ["*.tracker.example"]);
        assert_eq!(cache.flush_rules(&rules), 2);
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn test_flush_ip_splits_families() {
        let mut cache = GatekeeperCache::default();
        let dev = mac(DEV1);
        for (kind, ip) in [
            (RequestKind::Ipv4, "10.1.1.1"),
            (RequestKind::Ipv4, "10.1.1.2"),
            (RequestKind::Ipv6, "2001:db8::1"),
            (RequestKind::Ipv6, "2001:db8::2"),
        ] {
            cache
                .add_attribute(&AttributeRequest::new(Some(dev), kind, ip))
                .unwrap();
        }

        let rules = FlushRules::new().with_ips(SetOp::In, ["10.1.1.1", "2001:0db8:0000::0001", "garbage"]);
        assert_eq!(cache.flush_rules(&rules), 2);

        let still = |cache: &mut GatekeeperCache, kind, ip: &str| {
            cache
                .lookup_attribute(&AttributeRequest::new(Some(dev), kind, ip), false)
                .is_some()
        };
        assert!(still(&mut cache, RequestKind::Ipv4, "10.1.1.2"));
        assert!(still(&mut cache, RequestKind::Ipv6, "2001:db8::2"));
        assert!(!still(&mut cache, RequestKind::Ipv4, "10.1.1.1"));

        // OUT with only an IPv4 literal: every IPv6 entry is outside the
        // (empty) IPv6 subset.
        let rules = FlushRules::new().with_ips(SetOp::Out, ["10.1.1.2"]);
        assert_eq!(cache.flush_rules(&rules), 1);
        assert!(still(&mut cache, RequestKind::Ipv4, "10.1.1.2"));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_flush_app() {
        let mut cache = GatekeeperCache::default();
        for app in ["zoom", "teams", "steam"] {
            cache
                .add_attribute(&AttributeRequest::new(Some(mac(DEV2)), RequestKind::App, app))
                .unwrap();
        }

        let rules = FlushRules::new().with_apps(SetOp::Out, ["zoom", "teams"]);
        assert_eq!(cache.flush_rules(&rules), 1);
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn test_risk_and_category_gate() {
        let mut cache = GatekeeperCache::default();
        let dev = Some(mac(DEV1));
        cache
            .add_attribute(
                &AttributeRequest::new(dev, RequestKind::Fqdn, "low.example")
                    .with_confidence(2)
                    .with_category(7),
            )
            .unwrap();
        cache
            .add_attribute(
                &AttributeRequest::new(dev, RequestKind::Fqdn, "high.example")
                    .with_confidence(9)
                    .with_category(7),
            )
            .unwrap();
        cache
            .add_attribute(
                &AttributeRequest::new(dev, RequestKind::Fqdn, "other.example")
                    .with_confidence(9)
                    .with_category(8),
            )
            .unwrap();

        let rules = FlushRules::new()
            .with_fqdns(FqdnOp::SuffixIn, [".example"])
            .with_risk(RiskOp::Gte, 5)
            .with_categories(SetOp::In, vec![7]);
        assert_eq!(cache.flush_rules(&rules), 1);
        assert!(has_hostname(&mut cache, DEV1, "low.example"));
        assert!(has_hostname(&mut cache, DEV1, "other.example"));
        assert!(!has_hostname(&mut cache, DEV1, "high.example"));
    }

    #[test]
    fn test_invalid_macs_are_skipped() {
        let mut cache = three_devices();
        let rules = FlushRules::new().with_macs(SetOp::In, ["not-a-mac", DEV2]);
        assert_eq!(cache.flush_rules(&rules), 1);
        assert!(cache.device(&mac(DEV2)).is_none());
    }

    #[test]
    fn test_flush_all() {
        let mut cache = three_devices();
        cache
            .add_attribute(&AttributeRequest::new(None, RequestKind::Url, "http://x"))
            .unwrap();

        let scoped = FlushRules::new().with_macs(SetOp::In, [DEV1]);
        assert_eq!(cache.flush_all(&scoped), 1);
        assert_eq!(cache.entry_count(), 3);

        assert_eq!(cache.flush_all(&FlushRules::new()), 3);
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.device_count(), 0);
    }
}
