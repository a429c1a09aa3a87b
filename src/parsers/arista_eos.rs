//! Arista EOS output parsing. The routing table shares the IOS code-letter
//! shape; interface counters use unit-suffixed rates ("2.50 Gbps").

use super::{code_route_line, first_word, grammar};
use crate::model::{InterfaceDetail, InterfaceStatus, RouteEntry};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Parse `show ip route [vrf <vrf>] <destination>` output; EOS prints the
/// matching table line(s) rather than a prose entry.
pub fn route_entry(output: &str, context: &str) -> Option<RouteEntry> {
    if output.trim().is_empty() || output.to_ascii_lowercase().contains("no matching routes") {
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
        "O" => Some("ospf"),
        "B" => Some("bgp"),
        "K" => Some("kernel"),
        "i" => Some("isis"),
        _ => None,
    }
}

/// Parse `show vrf` output; the default VRF always leads the result.
pub fn vrf_list(output: &str) -> Vec<String> {
    let mut vrfs = vec!["default".to_string()];
    for line in output.lines() {
        if line.contains("VRF") && line.contains("RD") {
            continue;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('-') {
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

/// Parse `show ip interface brief`; addresses carry a /len suffix.
pub fn interface_brief(output: &str) -> HashMap<String, Ipv4Addr> {
    let mut interfaces = HashMap::new();
    for line in output.lines() {
        if line.contains("Interface") || line.contains("Address") {
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

/// Parse `show interfaces <name>` output.
pub fn interface_detail(output: &str) -> Option<InterfaceDetail> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut lines = trimmed.lines();
    let first = lines.next()?;

    // Ethernet1 is up, line protocol is up (connected)
    let (name, rest) = first.split_once(" is ")?;
    let line_protocol = grammar::after(first, "line protocol is ").and_then(first_word);
    let status = if rest.contains("administratively down") {
        InterfaceStatus::AdminDown
    } else if line_protocol.as_deref() == Some("up") {
        InterfaceStatus::Up
    } else {
        InterfaceStatus::Down
    };

    let mut detail = InterfaceDetail::named(name.trim());
    detail.status = status;

    let mut bandwidth_bps = 0u64;
    let mut input_rate = 0u64;
    let mut output_rate = 0u64;

    for line in lines {
        let line = line.trim();

        if let Some(desc) = line.strip_prefix("Description:") {
            detail.description = desc.trim().to_string();
            continue;
        }
        if let Some(bw) =
            grammar::after(line, "BW ").and_then(|s| grammar::run(grammar::decimal_u64, s))
        {
            bandwidth_bps = bw * 1000;
            continue;
        }
        if let Some(speed) = grammar::after(line, "duplex, ").and_then(first_word) {
            detail.speed = speed;
            continue;
        }
        if let Some(rate) = grammar::after(line, "5 minute input rate ")
            .and_then(|s| grammar::run(grammar::rate, s))
        {
            input_rate = rate;
            continue;
        }
        if let Some(rate) = grammar::after(line, "5 minute output rate ")
            .and_then(|s| grammar::run(grammar::rate, s))
        {
            output_rate = rate;
            continue;
        }
        // Counter lines can carry several counters at once
        // ("0 input queue drops, 3 output drops").
        if let Some(count) = grammar::count_before(line, "input errors") {
            detail.errors_in = count;
        }
        if let Some(count) = grammar::count_before(line, "output errors") {
            detail.errors_out = count;
        }
        if let Some(count) = grammar::count_before(line, "input queue drops") {
            detail.discards_in = count;
        }
        if let Some(count) = grammar::count_before(line, "output drops") {
            detail.discards_out = count;
        }
    }

    detail.utilisation_in_pct = grammar::utilisation_pct(input_rate, bandwidth_bps);
    detail.utilisation_out_pct = grammar::utilisation_pct(output_rate, bandwidth_bps);
    Some(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NextHop;

    #[test]
    fn parses_static_route_entry() {
        let output = "\
Codes: C - connected, S - static, K - kernel, O - OSPF, B - BGP

 S        192.168.1.0/24 [1/0] via 10.1.1.2, Ethernet1
";
        let route = route_entry(output, "default").unwrap();
        assert_eq!(route.destination.to_string(), "192.168.1.0/24");
        assert_eq!(route.protocol, "static");
        assert_eq!(route.next_hop, NextHop::Ip("10.1.1.2".parse().unwrap()));
        assert_eq!(route.outgoing_interface.as_deref(), Some("Ethernet1"));
        assert_eq!(route.logical_context, "default");
    }

    #[test]
    fn parses_connected_route_entry() {
        let output = " C        10.0.0.0/8 is directly connected, Vlan100\n";
        let route = route_entry(output, "default").unwrap();
        assert_eq!(route.next_hop, NextHop::Connected);
        assert_eq!(route.outgoing_interface.as_deref(), Some("Vlan100"));
    }

    #[test]
    fn no_matching_routes_returns_none() {
        assert!(route_entry("% No matching routes\n", "default").is_none());
    }

    #[test]
    fn parses_routing_table_in_order() {
        let output = "\
Codes: C - connected, S - static, K - kernel, O - OSPF, B - BGP

 C        10.1.1.0/24 is directly connected, Ethernet1
 O        10.2.0.0/16 [110/20] via 10.1.1.3, Ethernet2
 B        10.3.0.0/16 [200/0] via 10.1.1.4, Ethernet2
";
        let routes = routing_table(output, "default");
        assert_eq!(routes.len(), 3);
        let destinations: Vec<String> =
            routes.iter().map(|r| r.destination.to_string()).collect();
        assert_eq!(destinations, vec!["10.1.1.0/24", "10.2.0.0/16", "10.3.0.0/16"]);
        assert_eq!(routes[1].preference, 110);
        assert_eq!(routes[2].protocol, "bgp");
    }

    #[test]
    fn vrf_list_leads_with_default() {
        let output = "\
   VRF            RD            Protocols       State         Interfaces
--------------- ------------- --------------- ------------- -----------
   CUST-A         100:1         ipv4            up            Et1
   MGMT           100:9         ipv4            up            Ma1
";
        assert_eq!(vrf_list(output), vec!["default", "CUST-A", "MGMT"]);
    }

    #[test]
    fn parses_interface_brief_with_masks() {
        let output = "\
Interface         IP Address       Status     Protocol
Ethernet1         10.1.1.1/24      up         up
Ethernet2         unassigned       up         up
";
        let interfaces = interface_brief(output);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces["Ethernet1"], "10.1.1.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn parses_interface_detail_with_gbps_rates() {
        let output = "\
Ethernet1 is up, line protocol is up (connected)
  Hardware is Ethernet, address is 001c.7312.0001
  Description: Uplink to core
  MTU 9214 bytes, BW 10000000 Kbit/sec
  Full-duplex, 10Gb/s, auto negotiation: off, uni-link: n/a
  5 minute input rate 2.50 Gbps, 200000 packets/sec
  5 minute output rate 5.00 Gbps, 400000 packets/sec
     10 input errors, 5 CRC, 0 alignment, 0 symbol
     2 output errors, 0 collisions
     0 input queue drops, 3 output drops
";
        let detail = interface_detail(output).unwrap();
        assert_eq!(detail.name, "Ethernet1");
        assert_eq!(detail.status, InterfaceStatus::Up);
        assert_eq!(detail.speed, "10Gb/s");
        assert!((detail.utilisation_in_pct.unwrap() - 25.0).abs() < 1e-6);
        assert!((detail.utilisation_out_pct.unwrap() - 50.0).abs() < 1e-6);
        assert_eq!(detail.errors_in, 10);
        assert_eq!(detail.errors_out, 2);
        assert_eq!(detail.discards_in, 0);
        assert_eq!(detail.discards_out, 3);
    }

    #[test]
    fn notconnect_line_protocol_is_down() {
        let output = "Ethernet2 is up, line protocol is down (notconnect)\n";
        let detail = interface_detail(output).unwrap();
        assert_eq!(detail.status, InterfaceStatus::Down);
    }
}
