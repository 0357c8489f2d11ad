//! Address range expansion.
//!
//! Turns one scope range specification into the concrete targets it
//! covers. Recognized shapes:
//!
//! - a single literal address (`192.168.56.1`, `fe80::1`)
//! - an IPv4 CIDR block (`192.168.56.0/24`)
//! - an nmap-style wildcard last octet (`192.168.56.*`)
//! - an nmap-style last-octet range (`192.168.56.3-50`)
//! - an IPv6 network (`2001:db8::/120`), kept whole
//!
//! Any spec containing `:` is treated as IPv6 and never expanded.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4AddrRange, Ipv4Net, Ipv6Net};

use crate::error::ExpansionError;

/// One element of an expanded range: a single address, or an IPv6
/// network that is handed on unexpanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeTarget {
    Addr(IpAddr),
    Net(IpNet),
}

impl ScopeTarget {
    /// The concrete address, if this target is one.
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Self::Addr(ip) => Some(*ip),
            Self::Net(_) => None,
        }
    }
}

impl From<IpAddr> for ScopeTarget {
    fn from(ip: IpAddr) -> Self {
        Self::Addr(ip)
    }
}

impl fmt::Display for ScopeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(ip) => ip.fmt(f),
            Self::Net(net) => net.fmt(f),
        }
    }
}

/// Expand a range specification into an ascending list of targets.
///
/// CIDR blocks include their network and broadcast addresses.
pub fn expand(spec: &str) -> Result<Vec<ScopeTarget>, ExpansionError> {
    let spec = spec.trim();

    if spec.contains(':') {
        if let Ok(ip) = spec.parse::<Ipv6Addr>() {
            return Ok(vec![ScopeTarget::Addr(IpAddr::V6(ip))]);
        }
        return spec
            .parse::<Ipv6Net>()
            .map(|net| vec![ScopeTarget::Net(IpNet::V6(net))])
            .map_err(|_| ExpansionError::new(spec, "not an IPv6 address or network"));
    }

    if let Ok(ip) = spec.parse::<Ipv4Addr>() {
        return Ok(vec![ScopeTarget::Addr(IpAddr::V4(ip))]);
    }

    if spec.contains('/') {
        let net: Ipv4Net = spec
            .parse()
            .map_err(|e| ExpansionError::new(spec, format!("invalid CIDR block: {e}")))?;
        return Ok(Ipv4AddrRange::new(net.network(), net.broadcast())
            .map(|ip| ScopeTarget::Addr(IpAddr::V4(ip)))
            .collect());
    }

    let (prefix, last) = split_last_octet(spec)?;

    if last == "*" {
        return Ok(octet_span(prefix, 1, 255));
    }

    if let Some((lo, hi)) = last.split_once('-') {
        let lo = parse_octet(spec, lo)?;
        let hi = parse_octet(spec, hi)?;
        if lo > hi {
            return Err(ExpansionError::new(
                spec,
                format!("range start {lo} is greater than end {hi}"),
            ));
        }
        return Ok(octet_span(prefix, lo, hi));
    }

    Err(ExpansionError::new(spec, "unrecognized range shape"))
}

fn split_last_octet(spec: &str) -> Result<([u8; 3], &str), ExpansionError> {
    let parts: Vec<&str> = spec.split('.').collect();
    if parts.len() != 4 {
        return Err(ExpansionError::new(
            spec,
            format!("expected 4 octets, found {}", parts.len()),
        ));
    }
    let prefix = [
        parse_octet(spec, parts[0])?,
        parse_octet(spec, parts[1])?,
        parse_octet(spec, parts[2])?,
    ];
    Ok((prefix, parts[3]))
}

fn parse_octet(spec: &str, raw: &str) -> Result<u8, ExpansionError> {
    raw.parse::<u8>()
        .map_err(|_| ExpansionError::new(spec, format!("'{raw}' is not an octet")))
}

fn octet_span(prefix: [u8; 3], lo: u8, hi: u8) -> Vec<ScopeTarget> {
    (lo..=hi)
        .map(|last| Ipv4Addr::new(prefix[0], prefix[1], prefix[2], last))
        .map(|ip| ScopeTarget::Addr(IpAddr::V4(ip)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> ScopeTarget {
        ScopeTarget::Addr(s.parse().unwrap())
    }

    #[test]
    fn test_single_address() {
        assert_eq!(expand("10.0.0.7").unwrap(), vec![addr("10.0.0.7")]);
    }

    #[test]
    fn test_ipv6_specs_unexpanded() {
        assert_eq!(expand("fe80::1").unwrap(), vec![addr("fe80::1")]);

        let nets = expand("2001:db8::/120").unwrap();
        assert_eq!(
            nets,
            vec![ScopeTarget::Net("2001:db8::/120".parse().unwrap())]
        );
        assert_eq!(nets[0].to_string(), "2001:db8::/120");
        assert_eq!(nets[0].address(), None);

        assert!(expand("2001:db8::1-5").is_err());
        assert!(expand("fe80::zz").is_err());
    }

    #[test]
    fn test_wildcard_last_octet() {
        let ips = expand("192.168.56.*").unwrap();
        assert_eq!(ips.len(), 255);
        assert_eq!(ips[0], addr("192.168.56.1"));
        assert_eq!(ips[254], addr("192.168.56.255"));
        assert!(ips.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_octet_range() {
        let ips = expand("192.168.56.3-50").unwrap();
        assert_eq!(ips.len(), 48);
        assert_eq!(ips.first(), Some(&addr("192.168.56.3")));
        assert_eq!(ips.last(), Some(&addr("192.168.56.50")));

        assert_eq!(expand("10.1.1.9-9").unwrap(), vec![addr("10.1.1.9")]);
    }

    #[test]
    fn test_octet_range_errors() {
        assert!(expand("10.0.0.50-3").is_err());
        assert!(expand("10.0.0.a-3").is_err());
        assert!(expand("10.0.0.1-300").is_err());
        assert!(expand("10.0.1-5").is_err());
        assert!(expand("10.0.0.1-2-3").is_err());
    }

    #[test]
    fn test_cidr_includes_network_and_broadcast() {
        let ips = expand("10.0.0.0/30").unwrap();
        assert_eq!(
            ips,
            vec![
                addr("10.0.0.0"),
                addr("10.0.0.1"),
                addr("10.0.0.2"),
                addr("10.0.0.3")
            ]
        );
        assert_eq!(expand("10.0.0.9/32").unwrap(), vec![addr("10.0.0.9")]);
        assert_eq!(expand("10.0.0.0/24").unwrap().len(), 256);
    }

    #[test]
    fn test_unrecognized_shapes() {
        assert!(expand("example.com").is_err());
        assert!(expand("").is_err());
        assert!(expand("10.0.0.0/33").is_err());
        assert!(expand("10.x.0.*").is_err());
    }
}
