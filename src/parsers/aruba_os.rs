//! Aruba AOS-CX output parsing. Route lines follow the IOS code-letter
//! shape with VLAN interfaces; interface detail uses the AOS-CX layout
//! with separate RX/TX counter sections.

use super::{code_route_line, grammar};
use crate::model::{InterfaceDetail, InterfaceStatus, RouteEntry};
use std::collections::HashMap;
use std::net::Ipv4Addr;

pub fn route_entry(output: &str, context: &str) -> Option<RouteEntry> {
    if output.trim().is_empty() || output.to_ascii_lowercase().contains("no such route") {
        return None;
    }
    output
        .lines()
        .find_map(|line| code_route_line(line, context, protocol_code))
}

pub fn routing_table(output: &str, context: &str) -> Vec<RouteEntry> {
    output
        .lines()
        .filter_map(|line| code_route_line(line, context, protocol_code))
        .collect()
}

fn protocol_code(code: &str) -> Option<&'static str> {
    match code.trim_end_matches('*') {
        "C" => Some("connected"),
        "L" => Some("local"),
        "S" => Some("static"),
        "R" => Some("rip"),
        "O" => Some("ospf"),
        "B" => Some("bgp"),
        "i" => Some("isis"),
        _ => None,
    }
}

/// Parse `show vrf` output; the default VRF always leads the result.
pub fn vrf_list(output: &str) -> Vec<String> {
    let mut vrfs = vec!["default".to_string()];
    for line in output.lines() {
        if line.contains("VRF") || line.contains("---") {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            if name != "default" && !vrfs.iter().any(|v| v == name) {
                vrfs.push(name.to_string());
            }
        }
    }
    vrfs
}

pub fn interface_brief(output: &str) -> HashMap<String, Ipv4Addr> {
    let mut interfaces = HashMap::new();
    for line in output.lines() {
        if line.contains("Interface") || line.contains("---") {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(name), Some(addr)) = (parts.next(), parts.next()) {
            let addr = addr.split('/').next().unwrap_or(addr);
            if let Ok(ip) = addr.parse() {
                interfaces.insert(name.to_string(), ip);
            }
        }
    }
    interfaces
}

/// Parse `show interface <name>` output:
///
/// ```text
/// Interface 1/1/1 is up
///  Admin state is up
///  Description: Uplink
///  Speed 1000 Mb/s
///  RX
///      5 input errors
///      2 drops
///  TX
///      1 output errors
///      0 drops
/// ```
pub fn interface_detail(output: &str) -> Option<InterfaceDetail> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut lines = trimmed.lines();
    let first = lines.next()?;

    let rest = grammar::after(first, "Interface ")?;
    let mut words = rest.split_whitespace();
    let name = words.next()?;
    let link_up = rest.contains(" is up");

    let mut detail = InterfaceDetail::named(name);
    let mut admin_down = false;

    #[derive(PartialEq)]
    enum Section {
        None,
        Rx,
        Tx,
    }
    let mut section = Section::None;

    for line in lines {
        let line = line.trim();

        if let Some(state) = grammar::after(line, "Admin state is ") {
            admin_down = state.trim().eq_ignore_ascii_case("down");
            continue;
        }
        if let Some(desc) = line.strip_prefix("Description:") {
            detail.description = desc.trim().to_string();
            continue;
        }
        if let Some(speed) = line.strip_prefix("Speed ") {
            detail.speed = speed.trim().to_string();
            continue;
        }
        match line {
            "RX" => {
                section = Section::Rx;
                continue;
            }
            "TX" => {
                section = Section::Tx;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Rx => {
                if let Some(count) = grammar::count_before(line, "input errors") {
                    detail.errors_in = count;
                } else if let Some(count) = grammar::count_before(line, "drops") {
                    detail.discards_in = count;
                }
            }
            Section::Tx => {
                if let Some(count) = grammar::count_before(line, "output errors") {
                    detail.errors_out = count;
                } else if let Some(count) = grammar::count_before(line, "drops") {
                    detail.discards_out = count;
                }
            }
            Section::None => {}
        }
    }

    detail.status = if admin_down {
        InterfaceStatus::AdminDown
    } else if link_up {
        InterfaceStatus::Up
    } else {
        InterfaceStatus::Down
    };
    Some(detail)
}
