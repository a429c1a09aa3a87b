//! Domain model for control-plane path tracing.
//!
//! `Device` values are owned by the inventory and shared into hops as
//! `Arc`s; everything a hop gathered (route, interface detail, policy and
//! NAT results) is owned by the hop itself.

use chrono::{DateTime, Utc};
use cidr::Ipv4Cidr;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DurationMilliSeconds};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Vendor tags that imply firewall capabilities regardless of the
/// configured device kind.
const FIREWALL_VENDORS: &[&str] = &[
    "paloalto",
    "paloalto_panos",
    "cisco_asa",
    "cisco_ftd",
    "juniper_srx",
    "juniper_junos",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Router,
    Firewall,
    L3Switch,
    Unknown,
}

impl Default for DeviceKind {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A network device as loaded from the inventory. Unique by
/// (hostname, management IP); immutable for the lifetime of a trace.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub hostname: String,
    pub management_ip: Ipv4Addr,
    pub vendor: String,
    pub site: Option<String>,
    pub kind: DeviceKind,
    pub credentials_ref: String,
    pub logical_contexts: Vec<String>,
    pub default_context: String,
    pub subnets: Vec<Ipv4Cidr>,
    pub metadata: Map<String, Value>,
}

impl Device {
    pub fn is_firewall(&self) -> bool {
        self.kind == DeviceKind::Firewall || FIREWALL_VENDORS.contains(&self.vendor.as_str())
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.logical_contexts.iter().any(|c| c == context)
    }
}

/// Where a route sends traffic next. The variant doubles as the next-hop
/// kind: `Connected` and `Local` terminate the destination on the device,
/// `Null` and `Reject` black-hole it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NextHop {
    Ip(Ipv4Addr),
    Interface(String),
    Connected,
    Local,
    Null,
    Reject,
}

impl NextHop {
    pub fn ip(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Ip(ip) => Some(*ip),
            _ => None,
        }
    }
}

impl std::fmt::Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Interface(name) => write!(f, "{}", name),
            Self::Connected => write!(f, "connected"),
            Self::Local => write!(f, "local"),
            Self::Null => write!(f, "null"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// One normalised routing-table entry.
#[derive(Debug, Clone, Serialize)]
pub struct RouteEntry {
    pub destination: Ipv4Cidr,
    pub next_hop: NextHop,
    pub outgoing_interface: Option<String>,
    pub protocol: String,
    pub logical_context: String,
    pub metric: u32,
    pub preference: u32,
    /// Raw device output the entry was parsed from, kept for diagnostics.
    pub raw: String,
}

impl RouteEntry {
    pub fn new(destination: Ipv4Cidr, next_hop: NextHop) -> Self {
        Self {
            destination,
            next_hop,
            outgoing_interface: None,
            protocol: "unknown".to_string(),
            logical_context: "global".to_string(),
            metric: 0,
            preference: 0,
            raw: String::new(),
        }
    }

    /// Whether this route means the destination is terminated on the
    /// device that produced it.
    pub fn reaches(&self, target: Ipv4Addr) -> bool {
        matches!(self.next_hop, NextHop::Connected | NextHop::Local)
            || self.next_hop.ip() == Some(target)
    }

    pub fn is_blackhole(&self) -> bool {
        matches!(self.next_hop, NextHop::Null | NextHop::Reject)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceStatus {
    Up,
    Down,
    AdminDown,
    Unknown,
}

/// Operational detail for one interface. Populated best-effort; traces
/// carry `None` when the device refused or garbled the query.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDetail {
    pub name: String,
    pub description: String,
    pub status: InterfaceStatus,
    pub speed: String,
    pub utilisation_in_pct: Option<f64>,
    pub utilisation_out_pct: Option<f64>,
    pub errors_in: u64,
    pub errors_out: u64,
    pub discards_in: u64,
    pub discards_out: u64,
}

impl InterfaceDetail {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            status: InterfaceStatus::Unknown,
            speed: String::new(),
            utilisation_in_pct: None,
            utilisation_out_pct: None,
            errors_in: 0,
            errors_out: 0,
            discards_in: 0,
            discards_out: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Permit,
    Deny,
    Drop,
}

impl PolicyAction {
    /// Map a vendor action keyword into the common vocabulary.
    /// `allow` is the PAN-OS / packet-tracer spelling of `permit`.
    pub fn from_vendor(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" | "permit" => Some(Self::Permit),
            "deny" => Some(Self::Deny),
            "drop" => Some(Self::Drop),
            _ => None,
        }
    }
}

/// Matched firewall security rule.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyResult {
    pub rule_name: String,
    pub rule_position: u32,
    pub action: PolicyAction,
    pub source_zone: String,
    pub dest_zone: String,
    pub source_addresses: Vec<String>,
    pub dest_addresses: Vec<String>,
    pub services: Vec<String>,
    pub logging: bool,
    pub raw: String,
}

/// One direction of NAT rewriting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NatTranslation {
    pub original_ip: Ipv4Addr,
    pub original_port: Option<u16>,
    pub translated_ip: Ipv4Addr,
    pub translated_port: Option<u16>,
    pub rule_name: String,
}

/// NAT lookup result; source and destination translations are independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NatResult {
    pub snat: Option<NatTranslation>,
    pub dnat: Option<NatTranslation>,
}

/// How an IP was resolved to an inventory device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    Resolved,
    ResolvedBySite,
    NotFound,
    Ambiguous,
}

#[derive(Debug)]
pub struct ResolveResult {
    pub device: Option<Arc<Device>>,
    pub status: ResolveStatus,
    pub candidates: Vec<Arc<Device>>,
}

/// Identity reported by the device itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceInfo {
    pub hostname: String,
    pub version: String,
    pub model: String,
    pub serial: String,
}

/// Flow parameters for firewall policy and NAT lookups.
#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    pub source_ip: Ipv4Addr,
    pub destination_ip: Ipv4Addr,
    pub protocol: String,
    pub destination_port: u16,
}

/// One hop of the traced path.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct PathHop {
    pub sequence: u32,
    pub device: Arc<Device>,
    pub ingress_interface: Option<String>,
    pub egress_interface: Option<String>,
    pub logical_context: String,
    pub route_used: Option<RouteEntry>,
    #[serde_as(as = "DurationMilliSeconds<f64>")]
    pub lookup_time: Duration,
    pub notes: Option<String>,
    pub resolve_status: Option<ResolveStatus>,
    pub ingress_detail: Option<InterfaceDetail>,
    pub egress_detail: Option<InterfaceDetail>,
    pub policy_result: Option<PolicyResult>,
    pub nat_result: Option<NatResult>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Complete,
    Incomplete,
    Error,
    LoopDetected,
    Blackholed,
    MaxHopsExceeded,
    NeedsInput,
    AmbiguousHop,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Error => "error",
            Self::LoopDetected => "loop_detected",
            Self::Blackholed => "blackholed",
            Self::MaxHopsExceeded => "max_hops_exceeded",
            Self::NeedsInput => "needs_input",
            Self::AmbiguousHop => "ambiguous_hop",
        }
    }
}

/// A complete traced path, always returned even when the trace failed.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct TracePath {
    pub source_ip: Ipv4Addr,
    pub destination_ip: Ipv4Addr,
    pub hops: Vec<PathHop>,
    pub status: PathStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde_as(as = "DurationMilliSeconds<f64>")]
    pub total_time: Duration,
    pub metadata: Map<String, Value>,
}

impl TracePath {
    pub fn new(source_ip: Ipv4Addr, destination_ip: Ipv4Addr) -> Self {
        Self {
            source_ip,
            destination_ip,
            hops: Vec::new(),
            status: PathStatus::Incomplete,
            error_message: None,
            started_at: Utc::now(),
            total_time: Duration::from_secs(0),
            metadata: Map::new(),
        }
    }

    pub fn add_hop(&mut self, hop: PathHop) {
        self.hops.push(hop);
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn is_complete(&self) -> bool {
        self.status == PathStatus::Complete
    }
}

/// Session timeouts for device connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracerConfig {
    pub max_hops: u32,
    pub connection: ConnectionConfig,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            max_hops: 30,
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::parse_network;

    #[test]
    fn connected_route_reaches_destination() {
        let route = RouteEntry::new(parse_network("10.2.2.0/24").unwrap(), NextHop::Connected);
        assert!(route.reaches("10.2.2.20".parse().unwrap()));
        assert!(!route.is_blackhole());
    }

    #[test]
    fn next_hop_equal_to_target_reaches_destination() {
        let target: Ipv4Addr = "10.9.9.9".parse().unwrap();
        let route = RouteEntry::new(parse_network("10.9.9.9/32").unwrap(), NextHop::Ip(target));
        assert!(route.reaches(target));
        assert!(!route.reaches("10.9.9.8".parse().unwrap()));
    }

    #[test]
    fn null_route_is_blackhole() {
        let route = RouteEntry::new(parse_network("0.0.0.0/0").unwrap(), NextHop::Null);
        assert!(route.is_blackhole());
        assert!(!route.reaches("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn firewall_by_vendor_or_kind() {
        let mut device = Device {
            hostname: "fw1".into(),
            management_ip: "10.0.0.9".parse().unwrap(),
            vendor: "paloalto".into(),
            site: None,
            kind: DeviceKind::Unknown,
            credentials_ref: "default".into(),
            logical_contexts: vec!["default".into()],
            default_context: "default".into(),
            subnets: vec![],
            metadata: Map::new(),
        };
        assert!(device.is_firewall());

        device.vendor = "cisco_ios".into();
        assert!(!device.is_firewall());

        device.kind = DeviceKind::Firewall;
        assert!(device.is_firewall());
    }

    #[test]
    fn action_mapping() {
        assert_eq!(PolicyAction::from_vendor("allow"), Some(PolicyAction::Permit));
        assert_eq!(PolicyAction::from_vendor("Permit"), Some(PolicyAction::Permit));
        assert_eq!(PolicyAction::from_vendor("deny"), Some(PolicyAction::Deny));
        assert_eq!(PolicyAction::from_vendor("drop"), Some(PolicyAction::Drop));
        assert_eq!(PolicyAction::from_vendor("reset-both"), None);
    }

    #[test]
    fn trace_serialises_with_millisecond_durations() {
        let mut path = TracePath::new("10.1.1.10".parse().unwrap(), "10.2.2.20".parse().unwrap());
        path.total_time = Duration::from_millis(1500);
        path.status = PathStatus::NeedsInput;
        let value = serde_json::to_value(&path).unwrap();
        assert_eq!(value["status"], "needs_input");
        assert_eq!(value["total_time"], 1500.0);
        assert_eq!(value["source_ip"], "10.1.1.10");
    }
}
