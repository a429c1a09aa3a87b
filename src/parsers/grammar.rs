//! Token grammar shared by the vendor parsers.
//!
//! Small nom combinators for the lexical shapes that recur across CLI
//! output: IPv4 addresses, CIDR prefixes, the `[preference/metric]`
//! bracket, dotted subnet masks, and rate figures with unit suffixes.

use crate::net;
use cidr::Ipv4Cidr;
use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, digit1, space1};
use nom::combinator::{map, map_opt, map_res, opt, recognize};
use nom::sequence::{delimited, pair, separated_pair, tuple};
use nom::IResult;
use std::net::Ipv4Addr;

/// Run a parser over (left-trimmed) input, keeping the value and
/// discarding whatever trails it.
pub fn run<'a, T, P>(mut parser: P, input: &'a str) -> Option<T>
where
    P: FnMut(&'a str) -> IResult<&'a str, T>,
{
    parser(input.trim_start()).ok().map(|(_, value)| value)
}

/// Slice of `line` following the first occurrence of `anchor`,
/// left-trimmed.
pub fn after<'a>(line: &'a str, anchor: &str) -> Option<&'a str> {
    line.find(anchor)
        .map(|i| line[i + anchor.len()..].trim_start())
}

pub fn decimal_u8(input: &str) -> IResult<&str, u8> {
    map_res(digit1, str::parse)(input)
}

pub fn decimal_u16(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse)(input)
}

pub fn decimal_u32(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

pub fn decimal_u64(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse)(input)
}

pub fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

pub fn ipv4(input: &str) -> IResult<&str, Ipv4Addr> {
    map(
        tuple((
            decimal_u8,
            char('.'),
            decimal_u8,
            char('.'),
            decimal_u8,
            char('.'),
            decimal_u8,
        )),
        |(a, _, b, _, c, _, d)| Ipv4Addr::new(a, b, c, d),
    )(input)
}

/// `a.b.c.d/len`; host bits below the length are masked off.
pub fn prefix(input: &str) -> IResult<&str, Ipv4Cidr> {
    map_opt(separated_pair(ipv4, char('/'), decimal_u8), |(addr, len)| {
        net::masked_cidr(addr, len)
    })(input)
}

/// Either a CIDR prefix or a bare address taken as /32.
pub fn prefix_or_host(input: &str) -> IResult<&str, Ipv4Cidr> {
    alt((prefix, map_opt(ipv4, |addr| net::masked_cidr(addr, 32))))(input)
}

/// `network mask` in dotted-decimal pair form (ASA), e.g.
/// `10.1.1.0 255.255.255.0`.
pub fn masked_pair(input: &str) -> IResult<&str, Ipv4Cidr> {
    map_opt(separated_pair(ipv4, space1, ipv4), |(network, mask)| {
        net::masked_cidr(network, net::mask_prefix_length(mask))
    })(input)
}

/// The `[preference/metric]` bracket idiom.
pub fn pref_metric(input: &str) -> IResult<&str, (u32, u32)> {
    delimited(
        char('['),
        separated_pair(decimal_u32, char('/'), decimal_u32),
        char(']'),
    )(input)
}

fn decimal_fraction(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

fn unit_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '/')(input)
}

/// A rate figure with its unit, normalised to bits per second, e.g.
/// `230000000 bits/sec`, `2.50 Gbps`, `0 bps`. Trailing punctuation after
/// the unit is ignored.
pub fn rate(input: &str) -> IResult<&str, u64> {
    map_opt(
        separated_pair(decimal_fraction, space1, unit_token),
        |(value, unit)| rate_bps(value, unit),
    )(input)
}

pub fn rate_bps(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    Some((value * unit_factor(unit)?) as u64)
}

fn unit_factor(unit: &str) -> Option<f64> {
    match unit {
        "bps" | "bits/sec" => Some(1.0),
        "Kbps" => Some(1e3),
        "Mbps" => Some(1e6),
        "Gbps" => Some(1e9),
        _ => None,
    }
}

/// Utilisation percentage of a rate against configured bandwidth.
pub fn utilisation_pct(rate_bps: u64, bandwidth_bps: u64) -> Option<f64> {
    if bandwidth_bps == 0 {
        None
    } else {
        Some(rate_bps as f64 / bandwidth_bps as f64 * 100.0)
    }
}

/// Contents of the first double-quoted span in `s`.
pub fn quoted(s: &str) -> Option<&str> {
    let start = s.find('"')? + 1;
    let end = start + s[start..].find('"')?;
    Some(&s[start..end])
}

/// Last whitespace-separated token before `anchor`, parsed as a count.
/// Matches counter lines of the form `5 input errors, 3 CRC, ...`.
pub fn count_before(line: &str, anchor: &str) -> Option<u64> {
    let idx = line.find(anchor)?;
    let head = line[..idx].trim_end();
    head.rsplit(char::is_whitespace).next()?.parse().ok()
}

/// Split `ip:port` or `ip/port` into address and optional port.
pub fn ip_port(value: &str) -> Option<(Ipv4Addr, Option<u16>)> {
    let value = value.trim();
    let (ip, port) = match value.split_once(|c| c == ':' || c == '/') {
        Some((ip, port)) => (ip, Some(port)),
        None => (value, None),
    };
    Some((ip.parse().ok()?, port.and_then(|p| p.parse().ok())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addresses_and_prefixes() {
        assert_eq!(run(ipv4, "10.1.1.2, rest").unwrap().to_string(), "10.1.1.2");
        assert!(run(ipv4, "10.1.300.2").is_none());
        assert_eq!(run(prefix, "10.2.2.0/24").unwrap().to_string(), "10.2.2.0/24");
        assert_eq!(
            crate::net::prefix_length(&run(prefix_or_host, "10.2.2.7").unwrap()),
            32
        );
    }

    #[test]
    fn parses_masked_pair() {
        let cidr = run(masked_pair, "10.1.1.0 255.255.255.0").unwrap();
        assert_eq!(cidr.to_string(), "10.1.1.0/24");
        let all = run(masked_pair, "0.0.0.0 0.0.0.0").unwrap();
        assert_eq!(all.to_string(), "0.0.0.0/0");
    }

    #[test]
    fn parses_pref_metric_bracket() {
        assert_eq!(run(pref_metric, "[110/20]"), Some((110, 20)));
        assert_eq!(run(pref_metric, "[1/0] via"), Some((1, 0)));
        assert!(run(pref_metric, "110/20").is_none());
    }

    #[test]
    fn rate_units() {
        assert_eq!(run(rate, "230000000 bits/sec"), Some(230_000_000));
        assert_eq!(run(rate, "2.50 Gbps"), Some(2_500_000_000));
        assert_eq!(run(rate, "0 bps"), Some(0));
        assert_eq!(run(rate, "1000 Kbps"), Some(1_000_000));
        assert_eq!(run(rate, "5 Mbps"), Some(5_000_000));
        assert_eq!(
            run(rate, "230000000 bits/sec, 42000 packets/sec"),
            Some(230_000_000)
        );
        assert!(run(rate, "5 parsecs").is_none());
    }

    #[test]
    fn utilisation_arithmetic() {
        // 230 Mbps over a 1 Gbps link.
        let pct = utilisation_pct(230_000_000, 1_000_000_000).unwrap();
        assert!((pct - 23.0).abs() < 1e-6);
        assert_eq!(utilisation_pct(1, 0), None);
    }

    #[test]
    fn splits_ip_and_port() {
        assert_eq!(
            ip_port("10.1.1.100:8080"),
            Some(("10.1.1.100".parse().unwrap(), Some(8080)))
        );
        assert_eq!(
            ip_port("203.0.113.10/443"),
            Some(("203.0.113.10".parse().unwrap(), Some(443)))
        );
        assert_eq!(
            ip_port("203.0.113.10"),
            Some(("203.0.113.10".parse().unwrap(), None))
        );
        assert_eq!(ip_port("not-an-ip"), None);
    }
}
