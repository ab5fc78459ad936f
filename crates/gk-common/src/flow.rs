//! Network flow types
//!
//! 5-tuple plus direction, used as the exact key of cached flow verdicts.

use crate::error::GkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Direction of a flow relative to the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlowDirection {
    /// Direction not set by the caller
    #[default]
    Unspecified = 0,
    /// LAN device talking to the outside
    Outbound = 1,
    /// Outside peer talking to a LAN device
    Inbound = 2,
    /// LAN to LAN, never cached
    LanToLan = 3,
}

impl FlowDirection {
    /// Decode from the host's integer direction code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Outbound),
            2 => Some(Self::Inbound),
            3 => Some(Self::LanToLan),
            _ => None,
        }
    }

    /// Whether flows in this direction can be cached
    #[inline(always)]
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Inbound | Self::Outbound)
    }
}

impl TryFrom<i32> for FlowDirection {
    type Error = GkError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(GkError::UnknownCode { what: "flow direction", code })
    }
}

/// 5-tuple flow key with direction
///
/// Two keys are equal only if every field is equal. There is no
/// wildcarding and no reverse matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    /// Source address
    pub src: IpAddr,
    /// Destination address
    pub dst: IpAddr,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol
    pub protocol: u8,
    /// Flow direction
    pub direction: FlowDirection,
}

impl FlowKey {
    /// Create from IPv4 tuple
    #[inline(always)]
    pub const fn from_v4(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        protocol: u8,
        direction: FlowDirection,
    ) -> Self {
        Self {
            src: IpAddr::V4(src),
            dst: IpAddr::V4(dst),
            src_port,
            dst_port,
            protocol,
            direction,
        }
    }

    /// Create from IPv6 tuple
    #[inline(always)]
    pub const fn from_v6(
        src: Ipv6Addr,
        dst: Ipv6Addr,
        src_port: u16,
        dst_port: u16,
        protocol: u8,
        direction: FlowDirection,
    ) -> Self {
        Self {
            src: IpAddr::V6(src),
            dst: IpAddr::V6(dst),
            src_port,
            dst_port,
            protocol,
            direction,
        }
    }

    /// IP version (4 or 6), `None` when the two addresses disagree
    pub fn ip_version(&self) -> Option<u8> {
        match (self.src, self.dst) {
            (IpAddr::V4(_), IpAddr::V4(_)) => Some(4),
            (IpAddr::V6(_), IpAddr::V6(_)) => Some(6),
            _ => None,
        }
    }

    /// A key is well formed when both addresses share a family and the
    /// direction is inbound or outbound
    pub fn is_well_formed(&self) -> bool {
        self.ip_version().is_some() && self.direction.is_cacheable()
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {} ({:?})",
            self.src, self.src_port, self.dst, self.dst_port, self.protocol, self.direction
        )
    }
}
