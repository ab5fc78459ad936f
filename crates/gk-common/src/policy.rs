//! Verdict actions and flush-rule operators
//!
//! Operator enums carry the integer codes used by the policy collaborators.
//! A code that does not decode (`from_code` returns `None`) means "no
//! constraint" wherever a rule is evaluated.

use crate::error::GkError;
use serde::{Deserialize, Serialize};

/// Verdict action attached to a cached entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    /// No action recorded
    #[default]
    Unspecified = 0,
    /// Block traffic
    Block = 1,
    /// Allow traffic
    Allow = 2,
    /// Allow and report
    Observed = 3,
    /// No policy matched
    NoMatch = 4,
    /// DNS redirect
    Redirect = 5,
}

impl Action {
    /// Decode from integer code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Block),
            2 => Some(Self::Allow),
            3 => Some(Self::Observed),
            4 => Some(Self::NoMatch),
            5 => Some(Self::Redirect),
            _ => None,
        }
    }
}

impl TryFrom<i32> for Action {
    type Error = GkError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(GkError::UnknownCode { what: "action", code })
    }
}

/// Set-membership operator (MAC, application, IP and category rules)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SetOp {
    /// Match values not in the set
    Out = 0,
    /// Match values in the set
    In = 1,
}

impl SetOp {
    /// Decode from integer code. The "always true" code and unknown codes
    /// both decode to `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Out),
            1 => Some(Self::In),
            _ => None,
        }
    }

    /// Whether this is the negated form
    #[inline(always)]
    pub fn is_out(&self) -> bool {
        matches!(self, Self::Out)
    }
}

/// How a hostname pattern is compared against a cached hostname
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostnameMatch {
    /// Whole string equality
    Exact,
    /// Pattern is a suffix of the hostname
    Suffix,
    /// Pattern is a prefix of the hostname
    Prefix,
    /// Glob pattern
    Wildcard,
}

/// Hostname operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FqdnOp {
    /// Exact match, in set
    In = 0,
    /// Suffix match, in set
    SuffixIn = 1,
    /// Prefix match, in set
    PrefixIn = 2,
    /// Wildcard match, in set
    WildcardIn = 3,
    /// Exact match, not in set
    Out = 4,
    /// Suffix match, not in set
    SuffixOut = 5,
    /// Prefix match, not in set
    PrefixOut = 6,
    /// Wildcard match, not in set
    WildcardOut = 7,
}

impl FqdnOp {
    /// Decode from integer code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::In),
            1 => Some(Self::SuffixIn),
            2 => Some(Self::PrefixIn),
            3 => Some(Self::WildcardIn),
            4 => Some(Self::Out),
            5 => Some(Self::SuffixOut),
            6 => Some(Self::PrefixOut),
            7 => Some(Self::WildcardOut),
            _ => None,
        }
    }

    /// Whether this is one of the negated forms
    #[inline(always)]
    pub fn is_out(&self) -> bool {
        matches!(
            self,
            Self::Out | Self::SuffixOut | Self::PrefixOut | Self::WildcardOut
        )
    }

    /// Comparison mode, independent of negation
    pub fn mode(&self) -> HostnameMatch {
        match self {
            Self::In | Self::Out => HostnameMatch::Exact,
            Self::SuffixIn | Self::SuffixOut => HostnameMatch::Suffix,
            Self::PrefixIn | Self::PrefixOut => HostnameMatch::Prefix,
            Self::WildcardIn | Self::WildcardOut => HostnameMatch::Wildcard,
        }
    }
}

/// Numeric risk comparison, entry level on the left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RiskOp {
    /// `==`
    Eq = 0,
    /// `!=`
    Neq = 1,
    /// `>`
    Gt = 2,
    /// `<`
    Lt = 3,
    /// `>=`
    Gte = 4,
    /// `<=`
    Lte = 5,
}

impl RiskOp {
    /// Decode from integer code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Eq),
            1 => Some(Self::Neq),
            2 => Some(Self::Gt),
            3 => Some(Self::Lt),
            4 => Some(Self::Gte),
            5 => Some(Self::Lte),
            _ => None,
        }
    }
}

/// Operator plus value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRule<O, T> {
    /// Operator, `None` imposes no constraint
    pub op: Option<O>,
    /// Values the operator is evaluated against
    pub values: Vec<T>,
}

impl<O, T> SetRule<O, T> {
    /// Create a rule
    pub fn new(op: Option<O>, values: Vec<T>) -> Self {
        Self { op, values }
    }
}

/// MAC selection rule
pub type MacRule = SetRule<SetOp, String>;
/// Hostname rule
pub type FqdnRule = SetRule<FqdnOp, String>;
/// Application name rule
pub type AppRule = SetRule<SetOp, String>;
/// IP literal rule
pub type IpRule = SetRule<SetOp, String>;
/// Category membership rule
pub type CategoryRule = SetRule<SetOp, u32>;

/// Risk threshold rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRule {
    /// Comparison, `None` imposes no constraint
    pub op: Option<RiskOp>,
    /// Threshold compared against the entry's confidence level
    pub level: u32,
}

/// Declarative bulk-flush rule set
///
/// Every component is optional. Without a MAC rule the remaining filters
/// apply to every device and to the location-wide tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushRules {
    /// Device selection
    pub mac: Option<MacRule>,
    /// Hostname filter
    pub fqdn: Option<FqdnRule>,
    /// Application filter
    pub app: Option<AppRule>,
    /// IP filter
    pub ip: Option<IpRule>,
    /// Risk gate
    pub risk: Option<RiskRule>,
    /// Category gate
    pub category: Option<CategoryRule>,
}

fn owned<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

impl FlushRules {
    /// Empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Select devices by hardware address
    pub fn with_macs<I, S>(mut self, op: SetOp, macs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mac = Some(SetRule::new(Some(op), owned(macs)));
        self
    }

    /// Filter hostname entries
    pub fn with_fqdns<I, S>(mut self, op: FqdnOp, fqdns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fqdn = Some(SetRule::new(Some(op), owned(fqdns)));
        self
    }

    /// Filter application entries
    pub fn with_apps<I, S>(mut self, op: SetOp, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.app = Some(SetRule::new(Some(op), owned(apps)));
        self
    }

    /// Filter IPv4/IPv6 entries
    pub fn with_ips<I, S>(mut self, op: SetOp, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ip = Some(SetRule::new(Some(op), owned(ips)));
        self
    }

    /// Gate on confidence level
    pub fn with_risk(mut self, op: RiskOp, level: u32) -> Self {
        self.risk = Some(RiskRule { op: Some(op), level });
        self
    }

    /// Gate on category
    pub fn with_categories(mut self, op: SetOp, ids: Vec<u32>) -> Self {
        self.category = Some(SetRule::new(Some(op), ids));
        self
    }

    /// Whether any hostname, application or IP filter is present
    pub fn has_attribute_filter(&self) -> bool {
        self.fqdn.is_some() || self.app.is_some() || self.ip.is_some()
    }
}
