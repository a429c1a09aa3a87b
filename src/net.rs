//! IPv4 address and prefix helpers used by the inventory resolver and the
//! vendor parsers.

use crate::model::RouteEntry;
use cidr::{Cidr, Ipv4Cidr};
use std::net::Ipv4Addr;

pub fn is_valid_ip(s: &str) -> bool {
    s.trim().parse::<Ipv4Addr>().is_ok()
}

pub fn is_valid_network(s: &str) -> bool {
    parse_network(s).is_some()
}

/// Parse `a.b.c.d/len` (or a bare address, treated as /32) into a prefix.
///
/// Host bits below the prefix length are masked off, so `10.1.1.1/24`
/// yields `10.1.1.0/24` instead of an error.
pub fn parse_network(s: &str) -> Option<Ipv4Cidr> {
    let s = s.trim();
    let (addr, len) = match s.split_once('/') {
        Some((addr, len)) => (addr.parse::<Ipv4Addr>().ok()?, len.parse::<u8>().ok()?),
        None => (s.parse::<Ipv4Addr>().ok()?, 32),
    };
    masked_cidr(addr, len)
}

/// Build a prefix from an address and length, masking off host bits.
pub fn masked_cidr(addr: Ipv4Addr, len: u8) -> Option<Ipv4Cidr> {
    if len > 32 {
        return None;
    }
    let mask = prefix_mask(len);
    let network = Ipv4Addr::from(u32::from(addr) & mask);
    Ipv4Cidr::new(network, len).ok()
}

pub fn contains(network: &Ipv4Cidr, ip: Ipv4Addr) -> bool {
    network.contains(&ip)
}

pub fn prefix_length(network: &Ipv4Cidr) -> u8 {
    network.network_length()
}

/// Convert a dotted-decimal subnet mask into a CIDR prefix length.
/// Non-contiguous masks are treated by popcount, matching what the
/// firewall output can realistically contain.
pub fn mask_prefix_length(mask: Ipv4Addr) -> u8 {
    u32::from(mask).count_ones() as u8
}

fn prefix_mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

/// Longest prefix match over a list of networks. Ties keep the earlier
/// entry, preserving the order the networks were supplied in.
pub fn longest_prefix_match(ip: Ipv4Addr, networks: &[Ipv4Cidr]) -> Option<&Ipv4Cidr> {
    networks
        .iter()
        .filter(|n| n.contains(&ip))
        .fold(None, |best: Option<&Ipv4Cidr>, n| match best {
            Some(b) if b.network_length() >= n.network_length() => Some(b),
            _ => Some(n),
        })
}

/// Longest-prefix selection over already-parsed routes, for drivers whose
/// single-destination lookup returns a table rather than one entry.
pub fn best_route(routes: &[RouteEntry], destination: Ipv4Addr) -> Option<&RouteEntry> {
    routes
        .iter()
        .filter(|r| r.destination.contains(&destination))
        .fold(None, |best: Option<&RouteEntry>, r| match best {
            Some(b) if b.destination.network_length() >= r.destination.network_length() => Some(b),
            _ => Some(r),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NextHop;

    fn net(s: &str) -> Ipv4Cidr {
        parse_network(s).unwrap()
    }

    #[test]
    fn validates_addresses() {
        assert!(is_valid_ip("10.1.1.1"));
        assert!(!is_valid_ip("10.1.1"));
        assert!(!is_valid_ip("10.1.1.256"));
        assert!(!is_valid_ip("not-an-ip"));
    }

    #[test]
    fn parses_networks_with_host_bits() {
        assert_eq!(net("10.1.1.1/24").to_string(), "10.1.1.0/24");
        assert_eq!(net("0.0.0.0/0").to_string(), "0.0.0.0/0");
        let host = net("10.1.1.1");
        assert_eq!(prefix_length(&host), 32);
        assert!(contains(&host, "10.1.1.1".parse().unwrap()));
        assert!(parse_network("10.0.0.0/33").is_none());
    }

    #[test]
    fn containment() {
        assert!(contains(&net("10.1.0.0/16"), "10.1.200.3".parse().unwrap()));
        assert!(!contains(&net("10.1.0.0/16"), "10.2.0.1".parse().unwrap()));
    }

    #[test]
    fn mask_conversion() {
        assert_eq!(mask_prefix_length("255.255.255.0".parse().unwrap()), 24);
        assert_eq!(mask_prefix_length("255.255.255.255".parse().unwrap()), 32);
        assert_eq!(mask_prefix_length("0.0.0.0".parse().unwrap()), 0);
    }

    #[test]
    fn longest_prefix_wins() {
        let networks = vec![net("10.0.0.0/8"), net("10.1.0.0/16"), net("10.1.1.0/24")];
        let best = longest_prefix_match("10.1.1.9".parse().unwrap(), &networks).unwrap();
        assert_eq!(best.network_length(), 24);

        let best = longest_prefix_match("10.2.0.1".parse().unwrap(), &networks).unwrap();
        assert_eq!(best.network_length(), 8);

        assert!(longest_prefix_match("192.168.0.1".parse().unwrap(), &networks).is_none());
    }

    #[test]
    fn best_route_prefers_more_specific() {
        let routes = vec![
            RouteEntry::new(net("0.0.0.0/0"), NextHop::Ip("10.0.0.1".parse().unwrap())),
            RouteEntry::new(net("10.2.0.0/16"), NextHop::Ip("10.0.0.2".parse().unwrap())),
        ];
        let best = best_route(&routes, "10.2.2.20".parse().unwrap()).unwrap();
        assert_eq!(best.destination, net("10.2.0.0/16"));
    }
}
