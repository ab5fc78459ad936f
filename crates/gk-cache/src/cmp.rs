//! Comparator library for the flush engine
//!
//! Each factory maps an operator to a plain function. A missing operator
//! (`None`, which is also what every unknown operator code decodes to)
//! yields a comparator that always returns true, so an absent rule
//! component never constrains a flush.
//!
//! IN and OUT operators select the same equality comparator; the flush
//! engine applies the negation. Category membership is the exception and
//! negates itself.

use gk_common::{FqdnOp, HostnameMatch, MacAddr, RiskOp, SetOp};
use std::net::IpAddr;

/// Device address comparator
pub type MacComparator = fn(&MacAddr, &MacAddr) -> bool;
/// Hostname comparator: `(cached hostname, rule pattern)`
pub type HostnameComparator = fn(&str, &str) -> bool;
/// Application name comparator: `(cached name, rule name)`
pub type AppComparator = fn(&str, &str) -> bool;
/// IP comparator: `(cached address, rule address)`
pub type IpComparator = fn(&IpAddr, &IpAddr) -> bool;
/// Category comparator: `(cached category, rule set)`
pub type CategoryComparator = fn(u32, &[u32]) -> bool;
/// Risk comparator: `(cached level, rule level)`
pub type RiskComparator = fn(u32, u32) -> bool;

fn mac_eq(a: &MacAddr, b: &MacAddr) -> bool {
    a == b
}

fn mac_any(_: &MacAddr, _: &MacAddr) -> bool {
    true
}

/// MAC comparator for an operator
pub fn mac_comparator(op: Option<SetOp>) -> MacComparator {
    match op {
        Some(SetOp::In | SetOp::Out) => mac_eq,
        None => mac_any,
    }
}

fn text_eq(name: &str, other: &str) -> bool {
    name == other
}

fn text_any(_: &str, _: &str) -> bool {
    true
}

fn hostname_suffix(name: &str, pattern: &str) -> bool {
    name.ends_with(pattern)
}

fn hostname_prefix(name: &str, pattern: &str) -> bool {
    name.starts_with(pattern)
}

// A pattern that does not compile matches nothing.
fn hostname_wildcard(name: &str, pattern: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(name))
        .unwrap_or(false)
}

/// Hostname comparator for an operator
pub fn hostname_comparator(op: Option<FqdnOp>) -> HostnameComparator {
    match op.map(|op| op.mode()) {
        Some(HostnameMatch::Exact) => text_eq,
        Some(HostnameMatch::Suffix) => hostname_suffix,
        Some(HostnameMatch::Prefix) => hostname_prefix,
        Some(HostnameMatch::Wildcard) => hostname_wildcard,
        None => text_any,
    }
}

/// Application name comparator for an operator
pub fn app_comparator(op: Option<SetOp>) -> AppComparator {
    match op {
        Some(SetOp::In | SetOp::Out) => text_eq,
        None => text_any,
    }
}

fn ip_eq(a: &IpAddr, b: &IpAddr) -> bool {
    a == b
}

fn ip_any(_: &IpAddr, _: &IpAddr) -> bool {
    true
}

/// IP comparator for an operator
///
/// Equal addresses have equal canonical text forms, so parsed equality is
/// the same test as comparing canonical strings. Addresses of different
/// families never match.
pub fn ip_comparator(op: Option<SetOp>) -> IpComparator {
    match op {
        Some(SetOp::In | SetOp::Out) => ip_eq,
        None => ip_any,
    }
}

fn category_in(id: u32, set: &[u32]) -> bool {
    set.contains(&id)
}

fn category_out(id: u32, set: &[u32]) -> bool {
    !set.contains(&id)
}

fn category_any(_: u32, _: &[u32]) -> bool {
    true
}

/// Category comparator for an operator
pub fn category_comparator(op: Option<SetOp>) -> CategoryComparator {
    match op {
        Some(SetOp::In) => category_in,
        Some(SetOp::Out) => category_out,
        None => category_any,
    }
}

fn risk_eq(level: u32, threshold: u32) -> bool {
    level == threshold
}

fn risk_neq(level: u32, threshold: u32) -> bool {
    level != threshold
}

fn risk_gt(level: u32, threshold: u32) -> bool {
    level > threshold
}

fn risk_lt(level: u32, threshold: u32) -> bool {
    level < threshold
}

fn risk_gte(level: u32, threshold: u32) -> bool {
    level >= threshold
}

fn risk_lte(level: u32, threshold: u32) -> bool {
    level <= threshold
}

fn risk_any(_: u32, _: u32) -> bool {
    true
}

/// Risk comparator for an operator
pub fn risk_comparator(op: Option<RiskOp>) -> RiskComparator {
    match op {
        Some(RiskOp::Eq) => risk_eq,
        Some(RiskOp::Neq) => risk_neq,
        Some(RiskOp::Gt) => risk_gt,
        Some(RiskOp::Lt) => risk_lt,
        Some(RiskOp::Gte) => risk_gte,
        Some(RiskOp::Lte) => risk_lte,
        None => risk_any,
    }
}
