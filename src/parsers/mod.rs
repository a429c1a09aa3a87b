//! Vendor output parsers.
//!
//! One module per vendor family; each is pure and stateless, taking raw
//! CLI text and producing the normalised records from [`crate::model`].
//! Parsers keep routes in device order; the only reordering ever applied
//! is explicit longest-prefix selection done by the drivers.

pub mod arista_eos;
pub mod aruba_os;
pub mod cisco_asa;
pub mod cisco_ios;
pub mod grammar;
pub mod juniper_junos;
pub mod paloalto;

use crate::model::{NextHop, RouteEntry};
use std::net::Ipv4Addr;

/// Derive the next-hop variant from protocol name, next-hop address and
/// outgoing interface. `connected`/`local` terminate on the device; a
/// `Null` interface black-holes.
pub(crate) fn classify_next_hop(
    protocol: &str,
    next_hop_ip: Option<Ipv4Addr>,
    interface: Option<&str>,
) -> Option<NextHop> {
    match protocol {
        "connected" | "direct" => return Some(NextHop::Connected),
        "local" => return Some(NextHop::Local),
        _ => {}
    }
    if let Some(iface) = interface {
        if iface.starts_with("Null") {
            return Some(NextHop::Null);
        }
    }
    match (next_hop_ip, interface) {
        (Some(ip), _) => Some(NextHop::Ip(ip)),
        (None, Some(iface)) => Some(NextHop::Interface(iface.to_string())),
        (None, None) => None,
    }
}

pub(crate) fn first_word(input: &str) -> Option<String> {
    grammar::run(grammar::word, input).map(|w| w.trim_end_matches(',').to_string())
}

/// Parse a prefix at the start of `input`, returning it and the remainder.
pub(crate) fn prefix_at(input: &str) -> Option<(cidr::Ipv4Cidr, &str)> {
    grammar::prefix_or_host(input)
        .ok()
        .map(|(rest, p)| (p, rest.trim_start()))
}

/// Interface name trailing a `via` clause, skipping age tokens such as
/// `00:05:23`.
fn trailing_interface(via: &str) -> Option<String> {
    via.split(',')
        .skip(1)
        .map(str::trim)
        .filter(|tok| !tok.is_empty() && !tok.chars().all(|c| c.is_ascii_digit() || c == ':'))
        .last()
        .map(str::to_string)
}

/// Parse one code-letter route line of the IOS family shared by Cisco,
/// Arista and Aruba:
///
/// ```text
/// C        10.1.1.0/24 is directly connected, GigabitEthernet0/0
/// O        192.168.1.0/24 [110/20] via 10.1.1.2, 00:05:23, GigabitEthernet0/1
/// S*       0.0.0.0/0 [1/0] via 10.0.0.1
/// ```
///
/// Returns `None` for legend, header and continuation lines.
pub(crate) fn code_route_line(
    line: &str,
    context: &str,
    protocol_code: fn(&str) -> Option<&'static str>,
) -> Option<RouteEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("Codes:") || line.starts_with("Gateway") {
        return None;
    }

    let (code, rest) = line.split_once(char::is_whitespace)?;
    // Continuation lines ("10.0.0.0/8 is variably subnetted, ...") lead
    // with a prefix instead of a protocol code.
    if grammar::run(grammar::prefix_or_host, code).is_some() {
        return None;
    }
    let protocol = protocol_code(code)?;
    let rest = rest.trim_start();

    // An optional subcode (E1, E2, IA, L1, ...) may precede the prefix.
    let (destination, rest) = match prefix_at(rest) {
        Some(found) => found,
        None => {
            let (_, rest) = rest.split_once(char::is_whitespace)?;
            prefix_at(rest.trim_start())?
        }
    };

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

    let (preference, metric) = line
        .find('[')
        .and_then(|i| grammar::run(grammar::pref_metric, &line[i..]))
        .unwrap_or((0, 0));
    let via = grammar::after(rest, "via ")?;
    let next_hop_ip = grammar::run(grammar::ipv4, via)?;
    let interface = trailing_interface(via);

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
