//! Palo Alto PAN-OS output parsing: columnar route tables, key-value
//! interface output, `test security-policy-match` blocks and
//! `test nat-policy-match` translations.

use super::{first_word, grammar};
use crate::model::{
    InterfaceDetail, InterfaceStatus, NatResult, NatTranslation, NextHop, PolicyAction,
    PolicyResult, RouteEntry,
};
use crate::net;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Parse `show routing route destination <ip> virtual-router <vr>` output
/// and select the longest-prefix match among the returned rows.
pub fn route_entry(output: &str, destination: Ipv4Addr, context: &str) -> Option<RouteEntry> {
    if output.to_ascii_lowercase().contains("destination not found") {
        return None;
    }
    let routes = routing_table(output, context);
    net::best_route(&routes, destination).cloned()
}

/// Parse the columnar route table printed after the dashed header:
///
/// ```text
/// destination        nexthop         metric  flags   age      interface
/// ---------------   --------------   -----   -----   ------   -----------
/// 0.0.0.0/0         10.1.1.1         0       A S     123456   ethernet1/1
/// ```
pub fn routing_table(output: &str, context: &str) -> Vec<RouteEntry> {
    let mut routes = Vec::new();
    let mut in_data = false;
    for line in output.lines() {
        if line.contains("---") {
            in_data = true;
            continue;
        }
        if !in_data {
            continue;
        }
        if let Some(route) = route_line(line, context) {
            routes.push(route);
        }
    }
    routes
}

fn route_line(line: &str, context: &str) -> Option<RouteEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let destination = grammar::run(grammar::prefix, tokens[0])?;
    let next_hop_token = tokens[1];
    let metric = tokens[2].parse::<u32>().unwrap_or(0);

    // Flag letters run until the numeric age column.
    let mut i = 3;
    let mut flags = String::new();
    while i < tokens.len()
        && tokens[i].len() <= 2
        && tokens[i].chars().all(|c| c.is_ascii_alphabetic() || c == '?')
    {
        flags.push_str(tokens[i]);
        i += 1;
    }
    let interface = tokens[i..]
        .iter()
        .find(|t| t.chars().any(|c| c.is_ascii_alphabetic()))
        .map(|t| t.to_string());

    let protocol = if flags.contains('S') {
        "static"
    } else if flags.contains('C') {
        "connected"
    } else if flags.contains('O') {
        "ospf"
    } else if flags.contains('B') {
        "bgp"
    } else if flags.contains('R') {
        "rip"
    } else {
        "unknown"
    };

    let next_hop = if protocol == "connected" {
        NextHop::Connected
    } else if next_hop_token == "discard" {
        NextHop::Null
    } else if let Some(ip) = grammar::run(grammar::ipv4, next_hop_token) {
        NextHop::Ip(ip)
    } else if let Some(iface) = interface.clone() {
        NextHop::Interface(iface)
    } else {
        return None;
    };

    Some(RouteEntry {
        destination,
        next_hop,
        outgoing_interface: interface,
        protocol: protocol.to_string(),
        logical_context: context.to_string(),
        metric,
        // This output does not carry administrative preference.
        preference: 0,
        raw: line.to_string(),
    })
}

/// Parse `show routing virtual-router` output into virtual-router names.
pub fn virtual_router_list(output: &str) -> Vec<String> {
    let mut routers = Vec::new();
    for line in output.lines() {
        if let Some(name) = grammar::after(line, "Virtual Router:").and_then(first_word) {
            if !routers.contains(&name) {
                routers.push(name);
            }
        }
    }
    routers
}

/// Parse `show interface all` into interface → address.
pub fn interface_list(output: &str) -> HashMap<String, Ipv4Addr> {
    let mut interfaces = HashMap::new();
    let mut current: Option<String> = None;
    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("ethernet")
            || trimmed.starts_with("vlan")
            || trimmed.starts_with("tunnel")
            || trimmed.starts_with("ae")
        {
            current = trimmed.split_whitespace().next().map(str::to_string);
        }
        if line.to_ascii_lowercase().contains("ip:") {
            if let (Some(name), Some(ip)) = (current.take(), find_ipv4(line)) {
                interfaces.insert(name, ip);
            }
        }
    }
    interfaces
}

fn find_ipv4(line: &str) -> Option<Ipv4Addr> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .find_map(|tok| grammar::run(grammar::ipv4, tok))
}

/// Parse key-value `show interface <name>` output.
pub fn interface_detail(output: &str) -> Option<InterfaceDetail> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut name = None;
    let mut detail = InterfaceDetail::named("");

    for line in trimmed.lines() {
        let line = line.trim();

        if let Some(v) = line.strip_prefix("Name:") {
            name = v.trim().split_whitespace().next().map(str::to_string);
        } else if let Some(v) = line.strip_prefix("Description:") {
            detail.description = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("Link state:") {
            detail.status = match v.trim() {
                "up" => InterfaceStatus::Up,
                "down" => InterfaceStatus::Down,
                _ => InterfaceStatus::Unknown,
            };
        } else if let Some(v) = line.strip_prefix("Link speed:") {
            if let Some(speed) = grammar::run(grammar::decimal_u64, v.trim()) {
                detail.speed = format!("{}Mb/s", speed);
            }
        } else if let Some(v) = line.strip_prefix("Errors received:") {
            detail.errors_in = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("Errors transmitted:") {
            detail.errors_out = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("Drops received:") {
            detail.discards_in = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("Drops transmitted:") {
            detail.discards_out = v.trim().parse().unwrap_or(0);
        }
    }

    detail.name = name?;
    Some(detail)
}

/// Extract the zone name from `show interface <name>` output.
pub fn zone_from_interface(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| grammar::after(line.trim(), "Zone:").and_then(first_word))
}

/// Parse `test security-policy-match` output:
///
/// ```text
/// "Allow-Web" {
///         from trust;
///         source 10.0.0.0/8;
///         to untrust;
///         destination any;
///         application/service any/tcp/any/443;
///         action allow;
/// }
/// ```
pub fn security_policy_match(output: &str) -> Option<PolicyResult> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    let rule_name = grammar::quoted(trimmed)?.to_string();

    let mut source_zone = String::new();
    let mut dest_zone = String::new();
    let mut source_addresses = Vec::new();
    let mut dest_addresses = Vec::new();
    let mut services = Vec::new();
    let mut action = PolicyAction::Deny;

    for line in trimmed.lines() {
        let line = line.trim().trim_end_matches(';');

        if let Some(v) = line.strip_prefix("from ") {
            source_zone = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("to ") {
            dest_zone = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("source ") {
            source_addresses = v.split_whitespace().map(str::to_string).collect();
        } else if let Some(v) = line.strip_prefix("destination ") {
            dest_addresses = v.split_whitespace().map(str::to_string).collect();
        } else if let Some(v) = line.strip_prefix("application/service ") {
            services = vec![v.trim().to_string()];
        } else if let Some(v) = line.strip_prefix("action ") {
            action = PolicyAction::from_vendor(v).unwrap_or(PolicyAction::Deny);
        }
    }

    Some(PolicyResult {
        rule_name,
        rule_position: 0,
        action,
        source_zone,
        dest_zone,
        source_addresses,
        dest_addresses,
        services,
        logging: trimmed.to_ascii_lowercase().contains("log"),
        raw: output.to_string(),
    })
}

/// Parse `test nat-policy-match` output:
///
/// ```text
/// Matched NAT rule: "Web-DNAT"
///   Source translation: none
///   Destination translation: 203.0.113.10:443 ==> 10.1.1.50:443
/// ```
pub fn nat_policy_match(output: &str) -> Option<NatResult> {
    let rest = grammar::after(output, "Matched NAT rule:")?;
    let rule_name = grammar::quoted(rest)?.to_string();

    let snat = grammar::after(output, "Source translation:")
        .and_then(|v| translation(v, &rule_name));
    let dnat = grammar::after(output, "Destination translation:")
        .and_then(|v| translation(v, &rule_name));

    Some(NatResult { snat, dnat })
}

fn translation(value: &str, rule_name: &str) -> Option<NatTranslation> {
    let value = value.lines().next()?.trim();
    if value.eq_ignore_ascii_case("none") {
        return None;
    }
    let (original, translated) = value.split_once("==>")?;
    let (original_ip, original_port) = grammar::ip_port(original.trim())?;
    let (translated_ip, translated_port) = grammar::ip_port(translated.trim())?;
    Some(NatTranslation {
        original_ip,
        original_port,
        translated_ip,
        translated_port,
        rule_name: rule_name.to_string(),
    })
}
