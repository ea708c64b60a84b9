use std::fmt;
use std::str::FromStr;

use crate::Error;

// ── Network ─────────────────────────────────────────────────────────

/// Placement class of a subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetType {
    Public,
    Private,
    Isolated,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Isolated => "isolated",
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubnetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "isolated" => Ok(Self::Isolated),
            other => Err(Error::validation(
                "subnet_type",
                format!("unknown subnet type `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRef {
    pub id: String,
    pub subnet_type: SubnetType,
    pub availability_zone: String,
    /// Route table associated with the subnet, when it has its own.
    pub route_table_id: Option<String>,
}

/// Borrowed handle to an externally provisioned network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub id: String,
    pub subnets: Vec<SubnetRef>,
}

impl NetworkRef {
    /// Subnets of the given placement class, in declaration order.
    pub fn select(&self, subnet_type: SubnetType) -> Vec<&SubnetRef> {
        self.subnets
            .iter()
            .filter(|s| s.subnet_type == subnet_type)
            .collect()
    }

    /// Distinct route tables of the given placement class, in declaration order.
    pub fn route_tables(&self, subnet_type: SubnetType) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for id in self
            .select(subnet_type)
            .into_iter()
            .filter_map(|s| s.route_table_id.as_deref())
        {
            if !tables.contains(&id) {
                tables.push(id);
            }
        }
        tables
    }
}

// ── Compute ─────────────────────────────────────────────────────────

/// Machine image the fleet boots from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineImage {
    /// Latest Amazon Linux, resolved by the provisioning engine at deploy time.
    AmazonLinux,
    /// A fixed image id.
    Ami(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRef {
    pub id: String,
}

impl FirewallRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingGroupRef {
    pub id: String,
    pub network_id: String,
}

// ── Backend origin ──────────────────────────────────────────────────

/// Borrowed handle to the bucket-hosted static website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteOrigin {
    pub bucket_id: String,
    pub bucket_name: String,
    /// Public website endpoint, e.g. `http://my-bucket.s3-website-us-east-1.amazonaws.com`.
    pub website_url: String,
}

// ── Load balancing ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerKind {
    Network,
    Application,
}

impl LoadBalancerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Application => "application",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerRef {
    pub id: String,
    pub kind: LoadBalancerKind,
    pub network_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    TcpUdp,
    Tls,
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::TcpUdp => "TCP_UDP",
            Self::Tls => "TLS",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }

    /// Whether a network load balancer can listen on this protocol.
    pub fn is_layer4(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp | Self::TcpUdp | Self::Tls)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            "TCP_UDP" => Ok(Self::TcpUdp),
            "TLS" => Ok(Self::Tls),
            "HTTP" => Ok(Self::Http),
            "HTTPS" => Ok(Self::Https),
            other => Err(Error::validation(
                "protocol",
                format!("unknown protocol `{other}`"),
            )),
        }
    }
}

/// External side of a load balancer listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSpec {
    pub port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRef {
    pub id: String,
    pub load_balancer_id: String,
}
