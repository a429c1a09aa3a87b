//! Juniper Junos / SRX output parsing: `show route` entries with the
//! `*[Protocol/preference]` idiom, extensive interface detail, security
//! zones and policy/NAT match output.

use super::{classify_next_hop, first_word, grammar, prefix_at};
use crate::model::{
    InterfaceDetail, InterfaceStatus, NatResult, NatTranslation, PolicyAction, PolicyResult,
    RouteEntry,
};
use cidr::Ipv4Cidr;
use nom::bytes::complete::take_while1;
use nom::character::complete::char;
use nom::sequence::{delimited, separated_pair};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Header line of one route: `0.0.0.0/0  *[Static/5] 30d 12:45:00, metric 20`.
fn route_header(line: &str) -> Option<(Ipv4Cidr, String, u32, u32)> {
    let (destination, rest) = prefix_at(line.trim())?;
    let rest = rest.strip_prefix('*')?.trim_start();

    let (_, (protocol, preference)) = delimited(
        char('['),
        separated_pair(
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-'),
            char('/'),
            grammar::decimal_u32,
        ),
        char(']'),
    )(rest)
    .ok()?;

    let metric = grammar::after(rest, "metric ")
        .and_then(|s| grammar::run(grammar::decimal_u32, s))
        .unwrap_or(0);

    Some((
        destination,
        protocol.to_ascii_lowercase(),
        preference,
        metric,
    ))
}

/// Selected-hop line: `>  to 10.0.0.1 via ge-0/0/0.0` (direct routes omit
/// the `to` clause).
fn hop_line(line: &str) -> Option<(Option<Ipv4Addr>, Option<String>)> {
    if !line.contains('>') {
        return None;
    }
    let next_hop = grammar::after(line, "to ").and_then(|s| grammar::run(grammar::ipv4, s));
    let interface = grammar::after(line, "via ").and_then(first_word);
    if next_hop.is_none() && interface.is_none() {
        return None;
    }
    Some((next_hop, interface))
}

/// Parse `show route <destination>` output into the first active route.
pub fn route_entry(output: &str, context: &str) -> Option<RouteEntry> {
    routes(output, context, true).into_iter().next()
}

/// Parse full `show route` output.
pub fn routing_table(output: &str, context: &str) -> Vec<RouteEntry> {
    routes(output, context, false)
}

fn routes(output: &str, context: &str, first_only: bool) -> Vec<RouteEntry> {
    let lines: Vec<&str> = output.lines().collect();
    let mut found = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        if let Some((destination, protocol, preference, metric)) = route_header(lines[i]) {
            let mut next_hop_ip = None;
            let mut interface = None;
            for hop in lines.iter().skip(i + 1) {
                if route_header(hop).is_some() {
                    break;
                }
                if let Some((ip, iface)) = hop_line(hop) {
                    next_hop_ip = ip;
                    interface = iface;
                    break;
                }
            }

            if let Some(next_hop) =
                classify_next_hop(&protocol, next_hop_ip, interface.as_deref())
            {
                found.push(RouteEntry {
                    destination,
                    next_hop,
                    outgoing_interface: interface,
                    protocol,
                    logical_context: context.to_string(),
                    metric,
                    preference,
                    raw: lines[i].to_string(),
                });
                if first_only {
                    return found;
                }
            }
        }
        i += 1;
    }
    found
}

/// Parse `show routing-instances` output into instance names.
pub fn routing_instance_list(output: &str) -> Vec<String> {
    let mut instances = Vec::new();
    for line in output.lines() {
        if line.contains("Instance") && line.contains("Type") {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent > 0 {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            if !instances.iter().any(|i| i == name) {
                instances.push(name.to_string());
            }
        }
    }
    instances
}

/// Map interfaces to the routing instance they are bound to, from
/// `show routing-instances` output. Interface units are the indented
/// tokens below each instance line.
pub fn instance_interfaces(output: &str) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    let mut current: Option<String> = None;
    for line in output.lines() {
        if line.contains("Instance") && line.contains("Type") {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if indent == 0 {
            current = trimmed.split_whitespace().next().map(str::to_string);
            continue;
        }
        if let Some(instance) = &current {
            let looks_like_interface = trimmed.contains('/') || trimmed.contains('.');
            if looks_like_interface && trimmed.split_whitespace().count() == 1 {
                mapping.insert(trimmed.to_string(), instance.clone());
            }
        }
    }
    mapping
}

/// Parse `show interfaces <name> extensive` output.
pub fn interface_detail(output: &str) -> Option<InterfaceDetail> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut lines = trimmed.lines();
    let first = lines.next()?;

    // Physical interface: ge-0/0/0, Enabled, Physical link is Up
    let name = grammar::after(first, "Physical interface:").and_then(first_word)?;
    let link = grammar::after(first, "Physical link is ").and_then(first_word);
    let status = match link.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("up") => InterfaceStatus::Up,
        Some(_) => InterfaceStatus::Down,
        None => InterfaceStatus::Unknown,
    };

    let mut detail = InterfaceDetail::named(name);
    detail.status = status;

    for line in lines {
        let line = line.trim();

        if let Some(v) = line.strip_prefix("Description:") {
            detail.description = v.trim().to_string();
            continue;
        }
        if let Some(speed) = grammar::after(line, "Speed: ").and_then(first_word) {
            detail.speed = speed;
            continue;
        }
        if let Some(v) = grammar::after(line, "Input errors: ")
            .and_then(|s| grammar::run(grammar::decimal_u64, s))
        {
            detail.errors_in = v;
        }
        if let Some(v) = grammar::after(line, "Output errors: ")
            .and_then(|s| grammar::run(grammar::decimal_u64, s))
        {
            detail.errors_out = v;
        }
        if let Some(v) = grammar::after(line, "Input drops: ")
            .and_then(|s| grammar::run(grammar::decimal_u64, s))
        {
            detail.discards_in = v;
        }
        if let Some(v) = grammar::after(line, "Output drops: ")
            .and_then(|s| grammar::run(grammar::decimal_u64, s))
        {
            detail.discards_out = v;
        }
    }

    Some(detail)
}

/// Parse `show security zones` output into interface → zone.
pub fn security_zones(output: &str) -> HashMap<String, String> {
    let mut zones = HashMap::new();
    let mut current_zone: Option<String> = None;
    let mut in_interfaces = false;

    for line in output.lines() {
        let stripped = line.trim();

        if let Some(zone) = grammar::after(stripped, "Security zone:").and_then(first_word) {
            current_zone = Some(zone);
            in_interfaces = false;
            continue;
        }
        if stripped.starts_with("Interfaces bound:") {
            in_interfaces = true;
            continue;
        }
        if let (Some(zone), true) = (&current_zone, in_interfaces) {
            if stripped.is_empty() {
                continue;
            }
            let looks_like_interface = stripped
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic())
                && stripped.contains('/');
            if looks_like_interface {
                zones.insert(stripped.to_string(), zone.clone());
            } else {
                in_interfaces = false;
            }
        }
    }
    zones
}

/// Parse `show security match-policies` output.
pub fn security_policy_match(output: &str) -> Option<PolicyResult> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    let rule_name = grammar::after(trimmed, "Policy: ").and_then(first_word)?;
    let rule_position = grammar::after(trimmed, "Sequence number: ")
        .and_then(|s| grammar::run(grammar::decimal_u32, s))
        .unwrap_or(0);

    let source_zone = grammar::after(trimmed, "Source zone: ")
        .and_then(first_word)
        .unwrap_or_default();
    let dest_zone = grammar::after(trimmed, "Destination zone: ")
        .and_then(first_word)
        .unwrap_or_default();

    let source_addresses = list_after(trimmed, "Source addresses: ");
    let dest_addresses = list_after(trimmed, "Destination addresses: ");
    let services = list_after(trimmed, "Applications: ");

    let action_text = grammar::after(trimmed, "Action: ").and_then(first_word)?;
    let action = PolicyAction::from_vendor(&action_text)?;

    let lowered = trimmed.to_ascii_lowercase();
    let logging = lowered
        .rsplit("action:")
        .next()
        .map_or(false, |tail| tail.contains("log"));

    Some(PolicyResult {
        rule_name,
        rule_position,
        action,
        source_zone,
        dest_zone,
        source_addresses,
        dest_addresses,
        services,
        logging,
        raw: output.to_string(),
    })
}

fn list_after(output: &str, anchor: &str) -> Vec<String> {
    grammar::after(output, anchor)
        .and_then(|rest| rest.lines().next())
        .map(|line| {
            line.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Match source and destination NAT rule output against a flow. Junos
/// reports the rules separately, so both outputs are taken together.
pub fn nat_rules(
    source_output: &str,
    dest_output: &str,
    source_ip: Ipv4Addr,
    dest_ip: Ipv4Addr,
    port: u16,
) -> Option<NatResult> {
    let snat = nat_rule(source_output, "source NAT rule:").map(
        |(rule_name, translated_ip, translated_port)| NatTranslation {
            original_ip: source_ip,
            original_port: Some(port),
            translated_ip,
            translated_port,
            rule_name,
        },
    );
    let dnat = nat_rule(dest_output, "destination NAT rule:").map(
        |(rule_name, translated_ip, translated_port)| NatTranslation {
            original_ip: dest_ip,
            original_port: Some(port),
            translated_ip,
            translated_port,
            rule_name,
        },
    );

    if snat.is_none() && dnat.is_none() {
        return None;
    }
    Some(NatResult { snat, dnat })
}

fn nat_rule(output: &str, anchor: &str) -> Option<(String, Ipv4Addr, Option<u16>)> {
    let rule_name = grammar::after(output, anchor).and_then(first_word)?;
    let translated_ip = grammar::after(output, "translated address: ")
        .and_then(first_word)
        .and_then(|w| w.parse().ok())?;
    let translated_port = grammar::after(output, "translated port: ")
        .and_then(|s| grammar::run(grammar::decimal_u16, s));
    Some((rule_name, translated_ip, translated_port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NextHop;

    #[test]
    fn parses_static_route_entry() {
        let output = "\
inet.0: 15 destinations, 15 routes (15 active, 0 holddown, 0 hidden)
+ = Active Route, - = Last Active, * = Both

0.0.0.0/0          *[Static/5] 30d 12:45:00
                    >  to 10.0.0.1 via ge-0/0/0.0
";
        let route = route_entry(output, "global").unwrap();
        assert_eq!(route.destination.to_string(), "0.0.0.0/0");
        assert_eq!(route.protocol, "static");
        assert_eq!(route.preference, 5);
        assert_eq!(route.next_hop, NextHop::Ip("10.0.0.1".parse().unwrap()));
        assert_eq!(route.outgoing_interface.as_deref(), Some("ge-0/0/0.0"));
    }

    #[test]
    fn parses_direct_route_as_connected() {
        let output = "\
10.1.1.0/24        *[Direct/0] 10w6d 02:11:05
                    > via ge-0/0/1.0
";
        let route = route_entry(output, "global").unwrap();
        assert_eq!(route.next_hop, NextHop::Connected);
        assert_eq!(route.outgoing_interface.as_deref(), Some("ge-0/0/1.0"));
    }

    #[test]
    fn parses_routing_table_with_metric() {
        let output = "\
inet.0: 3 destinations, 3 routes (3 active, 0 holddown, 0 hidden)

0.0.0.0/0          *[Static/5] 30d 12:45:00
                    >  to 10.0.0.1 via ge-0/0/0.0
10.2.0.0/16        *[OSPF/10] 2d 01:00:00, metric 20
                    >  to 10.1.1.3 via ge-0/0/2.0
10.1.1.0/24        *[Direct/0] 10w6d 02:11:05
                    > via ge-0/0/1.0
";
        let routes = routing_table(output, "global");
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[1].protocol, "ospf");
        assert_eq!(routes[1].metric, 20);
        assert_eq!(routes[1].preference, 10);
        let destinations: Vec<String> =
            routes.iter().map(|r| r.destination.to_string()).collect();
        assert_eq!(destinations, vec!["0.0.0.0/0", "10.2.0.0/16", "10.1.1.0/24"]);
    }

    #[test]
    fn parses_interface_detail() {
        let output = "\
Physical interface: ge-0/0/0, Enabled, Physical link is Up
  Interface index: 148, SNMP ifIndex: 526
  Description: Outside uplink
  Link-level type: Ethernet, MTU: 1514, Speed: 1000mbps
  Input rate     : 250000000 bps (150000 pps)
  Output rate    : 500000000 bps (300000 pps)
  Input errors: 5, Output errors: 1
  Input drops: 2, Output drops: 0
";
        let detail = interface_detail(output).unwrap();
        assert_eq!(detail.name, "ge-0/0/0");
        assert_eq!(detail.status, InterfaceStatus::Up);
        assert_eq!(detail.description, "Outside uplink");
        assert_eq!(detail.speed, "1000mbps");
        assert_eq!(detail.errors_in, 5);
        assert_eq!(detail.errors_out, 1);
        assert_eq!(detail.discards_in, 2);
        assert_eq!(detail.discards_out, 0);
    }

    #[test]
    fn parses_security_zones() {
        let output = "\
Security zone: trust
  Send reset for non-SYN session TCP packets: Off
  Interfaces bound: 2
    ge-0/0/1.0
    ge-0/0/2.0

Security zone: untrust
  Send reset for non-SYN session TCP packets: Off
  Interfaces bound: 1
    ge-0/0/0.0
";
        let zones = security_zones(output);
        assert_eq!(zones["ge-0/0/1.0"], "trust");
        assert_eq!(zones["ge-0/0/2.0"], "trust");
        assert_eq!(zones["ge-0/0/0.0"], "untrust");
    }

    #[test]
    fn parses_security_policy_match() {
        let output = "\
Policy: Allow-Web, State: enabled, Index: 5, Scope Policy: 0, Sequence number: 1
  Source zone: trust, Destination zone: untrust
  Source addresses: 10.0.0.0/8
  Destination addresses: any
  Applications: junos-https
  Action: permit, log
";
        let policy = security_policy_match(output).unwrap();
        assert_eq!(policy.rule_name, "Allow-Web");
        assert_eq!(policy.rule_position, 1);
        assert_eq!(policy.action, PolicyAction::Permit);
        assert_eq!(policy.source_zone, "trust");
        assert_eq!(policy.dest_zone, "untrust");
        assert_eq!(policy.source_addresses, vec!["10.0.0.0/8"]);
        assert_eq!(policy.services, vec!["junos-https"]);
        assert!(policy.logging);
    }

    #[test]
    fn nat_rules_matches_both_directions() {
        let source_output = "\
source NAT rule: Internet-SNAT
  Rule-set: nat-out
  From zone: trust, To zone: untrust
  Match: source-address 10.0.0.0/8
  Then: translated address: 203.0.113.5
";
        let dest_output = "\
destination NAT rule: Web-DNAT
  Rule-set: nat-in
  From zone: untrust
  Match: destination-address 203.0.113.10
  Then: translated address: 10.1.1.100, translated port: 8080
";
        let nat = nat_rules(
            source_output,
            dest_output,
            "192.168.1.10".parse().unwrap(),
            "203.0.113.10".parse().unwrap(),
            443,
        )
        .unwrap();

        let snat = nat.snat.unwrap();
        assert_eq!(snat.rule_name, "Internet-SNAT");
        assert_eq!(snat.original_ip, "192.168.1.10".parse::<Ipv4Addr>().unwrap());
        assert_eq!(snat.translated_ip, "203.0.113.5".parse::<Ipv4Addr>().unwrap());

        let dnat = nat.dnat.unwrap();
        assert_eq!(dnat.rule_name, "Web-DNAT");
        assert_eq!(dnat.translated_ip, "10.1.1.100".parse::<Ipv4Addr>().unwrap());
        assert_eq!(dnat.translated_port, Some(8080));
    }

    #[test]
    fn nat_rules_without_match_is_none() {
        assert!(nat_rules("", "", "10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap(), 443)
            .is_none());
    }
}
