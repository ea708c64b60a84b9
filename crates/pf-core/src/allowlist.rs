//! Address allow-list to firewall rules.

use std::fmt;
use std::iter;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::{Error, Result};

/// A validated IPv4 or IPv6 CIDR range.
///
/// Host bits are kept as written, so `10.0.0.1/8` renders back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr(IpNet);

impl Cidr {
    pub fn net(&self) -> IpNet {
        self.0
    }

    pub fn addr(&self) -> IpAddr {
        self.0.addr()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix_len()
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<IpNet>().map(Self).map_err(|e| Error::InvalidCidr {
            range: s.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Parse every range, failing on the first malformed one.
pub fn parse_ranges<S: AsRef<str>>(ranges: &[S]) -> Result<Vec<Cidr>> {
    ranges.iter().map(|r| r.as_ref().parse()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Allow,
}

/// Inbound permission for one source range on the proxy port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowListRule {
    pub source: Cidr,
    pub port: u16,
    pub action: RuleAction,
}

/// One allow rule per range, in input order.
pub fn derive_rules(ranges: &[Cidr], port: u16) -> Vec<AllowListRule> {
    ranges
        .iter()
        .map(|&source| AllowListRule {
            source,
            port,
            action: RuleAction::Allow,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallEntry<'a> {
    Allow(&'a AllowListRule),
    DenyAll,
}

/// Inbound policy of the fleet: the allow rules, then deny everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRuleSet {
    port: u16,
    allow: Vec<AllowListRule>,
}

impl FirewallRuleSet {
    pub fn new(port: u16, allow: Vec<AllowListRule>) -> Self {
        Self { port, allow }
    }

    pub fn from_ranges(ranges: &[Cidr], port: u16) -> Self {
        Self::new(port, derive_rules(ranges, port))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn allow_rules(&self) -> &[AllowListRule] {
        &self.allow
    }

    /// No source can reach the port.
    pub fn is_closed(&self) -> bool {
        self.allow.is_empty()
    }

    /// Materialized policy; always ends with exactly one [`FirewallEntry::DenyAll`].
    pub fn entries(&self) -> impl Iterator<Item = FirewallEntry<'_>> {
        self.allow
            .iter()
            .map(FirewallEntry::Allow)
            .chain(iter::once(FirewallEntry::DenyAll))
    }
}
