//! Cisco ASA output parsing. ASA prints networks as address + dotted
//! mask pairs and names interfaces by their `nameif`; policy and NAT
//! questions are answered by one `packet-tracer` reply split into phases.

use super::{classify_next_hop, first_word, grammar};
use crate::model::{
    InterfaceDetail, InterfaceStatus, NatResult, NatTranslation, PolicyAction, PolicyResult,
    RouteEntry,
};
use cidr::Ipv4Cidr;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Parse `show route <destination>` output.
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
            // Routing entry for 10.1.1.0 255.255.255.0
            if let Some(rest) = grammar::after(line, "Routing entry for") {
                destination = grammar::run(grammar::masked_pair, rest);
                continue;
            }
        }
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
        // * 10.0.0.1, via outside
        // * directly connected, via inside
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

/// Parse full `show route` output.
pub fn routing_table(output: &str, context: &str) -> Vec<RouteEntry> {
    output
        .lines()
        .filter_map(|line| table_line(line, context))
        .collect()
}

fn table_line(line: &str, context: &str) -> Option<RouteEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("Codes:") || line.starts_with("Gateway") {
        return None;
    }

    let (code, rest) = line.split_once(char::is_whitespace)?;
    let protocol = protocol_code(code)?;
    let (destination, rest) = masked_pair_at(rest.trim_start())?;

    // C    10.1.1.0 255.255.255.0 is directly connected, inside
    if let Some(after_conn) = grammar::after(rest, "directly connected,") {
        let interface = first_word(after_conn);
        let next_hop = classify_next_hop(protocol, None, interface.as_deref())?;
        let mut route = RouteEntry::new(destination, next_hop);
        route.outgoing_interface = interface;
        route.protocol = protocol.to_string();
        route.logical_context = context.to_string();
        route.raw = line.to_string();
        return Some(route);
    }

    // S    0.0.0.0 0.0.0.0 [1/0] via 10.0.0.1, outside
    let (preference, metric) = line
        .find('[')
        .and_then(|i| grammar::run(grammar::pref_metric, &line[i..]))
        .unwrap_or((0, 0));
    let via = grammar::after(rest, "via ")?;
    let next_hop_ip = grammar::run(grammar::ipv4, via)?;
    let interface = via
        .split(',')
        .nth(1)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let next_hop = classify_next_hop(protocol, Some(next_hop_ip), interface.as_deref())?;
    Some(RouteEntry {
        destination,
        next_hop,
        outgoing_interface: interface,
        protocol: protocol.to_string(),
        logical_context: context.to_string(),
        metric,
        preference,
        raw: line.to_string(),
    })
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

fn masked_pair_at(input: &str) -> Option<(Ipv4Cidr, &str)> {
    grammar::masked_pair(input)
        .ok()
        .map(|(rest, p)| (p, rest.trim_start()))
}

/// Parse `show context` output into security-context names. The admin
/// context is flagged with a leading `*`.
pub fn context_list(output: &str) -> Vec<String> {
    let mut contexts = Vec::new();
    for line in output.lines() {
        if line.contains("Context Name") || line.contains("---") {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            let name = name.trim_start_matches('*');
            if !name.is_empty() && !contexts.iter().any(|c| c == name) {
                contexts.push(name.to_string());
            }
        }
    }
    contexts
}

/// Parse `show nameif` output into physical interface → nameif.
pub fn nameif_mapping(output: &str) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for line in output.lines() {
        if line.contains("Interface") && line.contains("Name") {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(interface), Some(nameif)) = (parts.next(), parts.next()) {
            if interface.chars().next().map_or(false, |c| c.is_ascii_alphabetic()) {
                mapping.insert(interface.to_string(), nameif.to_string());
            }
        }
    }
    mapping
}

/// Parse `show interface <name>` output. The physical name precedes the
/// quoted nameif on the first line.
pub fn interface_detail(output: &str) -> Option<InterfaceDetail> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut lines = trimmed.lines();
    let first = lines.next()?;

    // Interface GigabitEthernet0/0 "outside", is up, line protocol is up
    let rest = grammar::after(first, "Interface ")?;
    let name = first_word(rest)?;
    let line_protocol = grammar::after(first, "line protocol is ").and_then(first_word);
    let status = if first.contains("administratively down") {
        InterfaceStatus::AdminDown
    } else if line_protocol.as_deref() == Some("up") {
        InterfaceStatus::Up
    } else {
        InterfaceStatus::Down
    };

    let mut detail = InterfaceDetail::named(name);
    detail.status = status;

    let mut bandwidth_mbps = 0u64;
    let mut input_rate = 0u64;
    let mut output_rate = 0u64;

    for line in lines {
        let line = line.trim();

        if let Some(desc) = line.strip_prefix("Description:") {
            detail.description = desc.trim().to_string();
            continue;
        }
        // BW 1000 Mbps
        if line.contains("BW") && line.contains("Mbps") {
            if let Some(bw) =
                grammar::after(line, "BW ").and_then(|s| grammar::run(grammar::decimal_u64, s))
            {
                bandwidth_mbps = bw;
            }
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
        // 5 input errors, 1 output errors
        if let Some(count) = grammar::count_before(line, "input errors") {
            detail.errors_in = count;
        }
        if let Some(count) = grammar::count_before(line, "output errors") {
            detail.errors_out = count;
        }
        // 2 drops, 0 output drops
        if line.contains("output drops") {
            if let Some(count) = grammar::count_before(line, "drops,") {
                detail.discards_in = count;
            }
            if let Some(count) = grammar::count_before(line, "output drops") {
                detail.discards_out = count;
            }
        }
    }

    let bandwidth_bps = bandwidth_mbps * 1_000_000;
    detail.utilisation_in_pct = grammar::utilisation_pct(input_rate, bandwidth_bps);
    detail.utilisation_out_pct = grammar::utilisation_pct(output_rate, bandwidth_bps);
    detail.speed = if bandwidth_mbps >= 1000 {
        format!("{}Gb/s", bandwidth_mbps / 1000)
    } else if bandwidth_mbps > 0 {
        format!("{}Mb/s", bandwidth_mbps)
    } else {
        String::new()
    };
    Some(detail)
}

/// Split a `packet-tracer ... detailed` reply into its phases and extract
/// the matched access-list (policy), the UN-NAT phase (destination NAT),
/// the NAT phase (source NAT) and the final action.
pub fn packet_tracer(output: &str) -> (Option<PolicyResult>, Option<NatResult>) {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    let final_action = grammar::after(output, "Action: ")
        .and_then(first_word)
        .and_then(|w| PolicyAction::from_vendor(&w))
        .map(|a| match a {
            // packet-tracer's terminal verdict is allow/drop.
            PolicyAction::Drop => PolicyAction::Deny,
            other => other,
        })
        .unwrap_or(PolicyAction::Deny);

    let mut policy = None;
    let mut snat = None;
    let mut dnat = None;

    for phase in split_phases(trimmed) {
        let phase_type = match grammar::after(&phase, "Type: ").and_then(first_word) {
            Some(t) => t,
            None => continue,
        };

        match phase_type.as_str() {
            "ACCESS-LIST" => {
                let rule_name = grammar::after(&phase, "access-list ")
                    .or_else(|| grammar::after(&phase, "access-group "))
                    .and_then(first_word)
                    .unwrap_or_default();
                policy = Some(PolicyResult {
                    rule_name,
                    rule_position: 0,
                    action: final_action,
                    source_zone: String::new(),
                    dest_zone: String::new(),
                    source_addresses: Vec::new(),
                    dest_addresses: Vec::new(),
                    services: Vec::new(),
                    logging: phase.to_ascii_lowercase().contains("log"),
                    raw: phase.clone(),
                });
            }
            "UN-NAT" => {
                // Untranslate 203.0.113.10/443 to 10.1.1.50/443
                dnat = translation(&phase, "Untranslate ");
            }
            "NAT" => {
                // Dynamic translate 192.168.1.100/54321 to 203.0.113.1/54321
                snat = translation(&phase, "translate ");
            }
            _ => {}
        }
    }

    let nat = if snat.is_some() || dnat.is_some() {
        Some(NatResult { snat, dnat })
    } else {
        None
    };
    (policy, nat)
}

fn split_phases(output: &str) -> Vec<String> {
    let mut phases = Vec::new();
    let mut current: Option<String> = None;
    for line in output.lines() {
        if line.trim_start().starts_with("Phase:") {
            if let Some(done) = current.take() {
                phases.push(done);
            }
            current = Some(String::new());
        }
        if let Some(block) = current.as_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }
    if let Some(done) = current {
        phases.push(done);
    }
    phases
}

fn translation(phase: &str, anchor: &str) -> Option<NatTranslation> {
    let rest = grammar::after(phase, anchor)?;
    let original = first_word(rest)?;
    let translated = grammar::after(rest, " to ").and_then(first_word)?;
    let (original_ip, original_port) = grammar::ip_port(&original)?;
    let (translated_ip, translated_port) = grammar::ip_port(&translated)?;

    let rule_name = phase
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("nat "))
        .unwrap_or("")
        .to_string();

    Some(NatTranslation {
        original_ip,
        original_port,
        translated_ip,
        translated_port,
        rule_name,
    })
}
