//! Cisco IOS / IOS-XE / NX-OS output parsing.

use super::{classify_next_hop, code_route_line, first_word, grammar};
use crate::model::{InterfaceDetail, InterfaceStatus, RouteEntry};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Parse `show ip route <destination>` output into a single route.
pub fn route_entry(output: &str, context: &str) -> Option<RouteEntry> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().contains("not in table") {
        return None;
    }

    let mut destination = None;
    let mut protocol = String::from("unknown");
    let mut preference = 0u32;
    let mut metric = 0u32;
    let mut next_hop_ip: Option<Ipv4Addr> = None;
    let mut interface: Option<String> = None;

    for line in trimmed.lines() {
        if destination.is_none() {
            if let Some(rest) = grammar::after(line, "Routing entry for") {
                destination = grammar::run(grammar::prefix_or_host, rest);
                continue;
            }
        }

        // Known via "ospf 1", distance 110, metric 20
        if line.contains("Known via") {
            if let Some(p) = grammar::quoted(line) {
                protocol = p.to_string();
            }
            if let Some(d) = grammar::after(line, "distance ")
                .and_then(|s| grammar::run(grammar::decimal_u32, s))
            {
                preference = d;
            }
            if let Some(m) = grammar::after(line, "metric ")
                .and_then(|s| grammar::run(grammar::decimal_u32, s))
            {
                metric = m;
            }
            continue;
        }

        // Routing descriptor blocks:
        //   * 10.1.1.2, from 10.2.2.2, 00:05:23 ago, via GigabitEthernet0/1
        //   * directly connected, via GigabitEthernet0/0
        let l = line.trim_start();
        if let Some(block) = l.strip_prefix('*') {
            let block = block.trim_start();
            if let Some(rest) = grammar::after(block, "directly connected, via ") {
                interface = first_word(rest);
            } else if let Some(ip) = grammar::run(grammar::ipv4, block) {
                next_hop_ip = Some(ip);
                if let Some(rest) = grammar::after(block, "via ") {
                    interface = first_word(rest);
                }
            }
            continue;
        }

        // Last update from 10.1.1.2 on GigabitEthernet0/1, 00:05:23 ago
        if next_hop_ip.is_none() {
            if let Some(rest) = grammar::after(line, "Last update from ") {
                next_hop_ip = grammar::run(grammar::ipv4, rest);
                if let Some(rest) = grammar::after(rest, " on ") {
                    interface = first_word(rest);
                }
            }
        }
    }

    let destination = destination?;
    let next_hop = classify_next_hop(&protocol, next_hop_ip, interface.as_deref())?;
    Some(RouteEntry {
        destination,
        next_hop,
        outgoing_interface: interface,
        protocol,
        logical_context: context.to_string(),
        metric,
        preference,
        raw: output.to_string(),
    })
}

/// Parse full `show ip route` output. Continuation and legend lines are
/// skipped; route order follows the device output.
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
        "D" => Some("eigrp"),
        "R" => Some("rip"),
        "i" => Some("isis"),
        _ => None,
    }
}

/// Parse `show vrf` / `show ip vrf` output into VRF names.
pub fn vrf_list(output: &str) -> Vec<String> {
    let mut vrfs = Vec::new();
    for line in output.lines() {
        if line.contains("Name") || line.contains("---") {
            continue;
        }
        // Interface continuation lines are indented past the name column.
        let indent = line.len() - line.trim_start().len();
        if indent > 2 {
            continue;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            vrfs.push(name.to_string());
        }
    }
    vrfs
}

/// Parse `show ip interface brief` into interface → address.
pub fn interface_brief(output: &str) -> HashMap<String, Ipv4Addr> {
    let mut interfaces = HashMap::new();
    for line in output.lines() {
        if line.contains("Interface") || line.contains("---") {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(name), Some(addr)) = (parts.next(), parts.next()) {
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

    // GigabitEthernet0/1 is up, line protocol is up
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
        } else if let Some(bw) = grammar::after(line, "BW ")
            .and_then(|s| grammar::run(grammar::decimal_u64, s))
        {
            // BW 1000000 Kbit/sec
            bandwidth_bps = bw * 1000;
        } else if let Some(speed) = grammar::after(line, "duplex, ").and_then(first_word) {
            detail.speed = speed;
        } else if let Some(rate) = grammar::after(line, "5 minute input rate ")
            .and_then(|s| grammar::run(grammar::rate, s))
        {
            input_rate = rate;
        } else if let Some(rate) = grammar::after(line, "5 minute output rate ")
            .and_then(|s| grammar::run(grammar::rate, s))
        {
            output_rate = rate;
        } else {
            // A counter line can carry several counters at once.
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
    fn parses_connected_route_entry() {
        let output = "\
Routing entry for 10.1.1.0/24
  Known via \"connected\", distance 0, metric 0 (connected, via interface)
  Routing Descriptor Blocks:
  * directly connected, via GigabitEthernet0/0
      Route metric is 0, traffic share count is 1
";
        let route = route_entry(output, "global").unwrap();
        assert_eq!(route.destination.to_string(), "10.1.1.0/24");
        assert_eq!(route.protocol, "connected");
        assert_eq!(route.next_hop, NextHop::Connected);
        assert_eq!(route.outgoing_interface.as_deref(), Some("GigabitEthernet0/0"));
        assert_eq!(route.preference, 0);
    }

    #[test]
    fn parses_ospf_route_entry() {
        let output = "\
Routing entry for 192.168.1.0/24
  Known via \"ospf 1\", distance 110, metric 20, type intra area
  Last update from 10.1.1.2 on GigabitEthernet0/1, 00:05:23 ago
  Routing Descriptor Blocks:
  * 10.1.1.2, from 10.2.2.2, 00:05:23 ago, via GigabitEthernet0/1
      Route metric is 20, traffic share count is 1
";
        let route = route_entry(output, "global").unwrap();
        assert_eq!(route.destination.to_string(), "192.168.1.0/24");
        assert_eq!(route.protocol, "ospf 1");
        assert_eq!(route.next_hop, NextHop::Ip("10.1.1.2".parse().unwrap()));
        assert_eq!(route.outgoing_interface.as_deref(), Some("GigabitEthernet0/1"));
        assert_eq!(route.preference, 110);
        assert_eq!(route.metric, 20);
    }

    #[test]
    fn parses_static_null_route_as_blackhole() {
        let output = "\
Routing entry for 10.66.0.0/16
  Known via \"static\", distance 1, metric 0
  Routing Descriptor Blocks:
  * directly connected, via Null0
      Route metric is 0, traffic share count is 1
";
        let route = route_entry(output, "global").unwrap();
        assert_eq!(route.next_hop, NextHop::Null);
        assert!(route.is_blackhole());
    }

    #[test]
    fn no_route_returns_none() {
        assert!(route_entry("% Network not in table\n", "global").is_none());
        assert!(route_entry("", "global").is_none());
    }

    #[test]
    fn parses_routing_table() {
        let output = "\
Codes: L - local, C - connected, S - static, R - RIP, M - mobile, B - BGP
       D - EIGRP, EX - EIGRP external, O - OSPF, IA - OSPF inter area

Gateway of last resort is 10.0.0.1 to network 0.0.0.0

S*    0.0.0.0/0 [1/0] via 10.0.0.1
      10.0.0.0/8 is variably subnetted, 3 subnets, 2 masks
C        10.1.1.0/24 is directly connected, GigabitEthernet0/0
L        10.1.1.1/32 is directly connected, GigabitEthernet0/0
O        10.2.2.0/24 [110/20] via 10.1.1.2, 00:05:23, GigabitEthernet0/1
";
        let routes = routing_table(output, "global");
        assert_eq!(routes.len(), 4);

        assert_eq!(routes[0].destination.to_string(), "0.0.0.0/0");
        assert_eq!(routes[0].protocol, "static");
        assert_eq!(routes[0].next_hop, NextHop::Ip("10.0.0.1".parse().unwrap()));
        assert_eq!(routes[0].preference, 1);

        assert_eq!(routes[1].protocol, "connected");
        assert_eq!(routes[1].next_hop, NextHop::Connected);

        assert_eq!(routes[2].protocol, "local");
        assert_eq!(routes[2].next_hop, NextHop::Local);

        assert_eq!(routes[3].metric, 20);
        assert_eq!(
            routes[3].outgoing_interface.as_deref(),
            Some("GigabitEthernet0/1")
        );
    }

    #[test]
    fn table_round_trips_destination_set() {
        let output = "\
S*    0.0.0.0/0 [1/0] via 10.0.0.1
C        10.1.1.0/24 is directly connected, GigabitEthernet0/0
O        10.2.2.0/24 [110/20] via 10.1.1.2, 00:05:23, GigabitEthernet0/1
";
        let routes = routing_table(output, "global");
        let parsed: Vec<String> = routes.iter().map(|r| r.destination.to_string()).collect();
        assert_eq!(parsed, vec!["0.0.0.0/0", "10.1.1.0/24", "10.2.2.0/24"]);
    }

    #[test]
    fn parses_vrf_list() {
        let output = "\
  Name                             Default RD            Interfaces
  CORP                             100:1                 Gi0/1
                                                         Gi0/2
  GUEST                            100:2                 Gi0/3
";
        let vrfs = vrf_list(output);
        assert_eq!(vrfs, vec!["CORP", "GUEST"]);
    }

    #[test]
    fn parses_interface_brief() {
        let output = "\
Interface              IP-Address      OK? Method Status                Protocol
GigabitEthernet0/0     10.1.1.1        YES manual up                    up
GigabitEthernet0/1     unassigned      YES unset  administratively down down
";
        let interfaces = interface_brief(output);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(
            interfaces["GigabitEthernet0/0"],
            "10.1.1.1".parse::<Ipv4Addr>().unwrap()
        );
    }

    #[test]
    fn parses_interface_detail_with_utilisation() {
        let output = "\
GigabitEthernet0/1 is up, line protocol is up
  Hardware is iGbE, address is 0050.5689.0001
  Description: Uplink to spine
  MTU 1500 bytes, BW 1000000 Kbit/sec, DLY 10 usec,
  Full-duplex, 1000Mb/s, media type is RJ45
  5 minute input rate 230000000 bits/sec, 42000 packets/sec
  5 minute output rate 460000000 bits/sec, 61000 packets/sec
     5 input errors, 3 CRC, 0 frame, 0 overrun, 2 ignored
     1 output errors, 0 collisions, 2 interface resets
     10 input queue drops
     5 output drops
";
        let detail = interface_detail(output).unwrap();
        assert_eq!(detail.name, "GigabitEthernet0/1");
        assert_eq!(detail.description, "Uplink to spine");
        assert_eq!(detail.status, InterfaceStatus::Up);
        assert_eq!(detail.speed, "1000Mb/s");
        assert!((detail.utilisation_in_pct.unwrap() - 23.0).abs() < 1e-6);
        assert!((detail.utilisation_out_pct.unwrap() - 46.0).abs() < 1e-6);
        assert_eq!(detail.errors_in, 5);
        assert_eq!(detail.errors_out, 1);
        assert_eq!(detail.discards_in, 10);
        assert_eq!(detail.discards_out, 5);
    }

    #[test]
    fn admin_down_takes_precedence() {
        let output = "GigabitEthernet0/2 is administratively down, line protocol is down\n";
        let detail = interface_detail(output).unwrap();
        assert_eq!(detail.status, InterfaceStatus::AdminDown);
    }
}
