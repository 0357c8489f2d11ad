//! Scope membership: which addresses may be targeted.
//!
//! An address is in scope iff it matches at least one include range and
//! none of the exclude ranges. Exclusion always wins.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::range::{self, ScopeTarget};

/// Include and exclude range specifications, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeConfig {
    #[serde(default)]
    pub ranges: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScopeResolver {
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl ScopeResolver {
    pub fn new(config: &ScopeConfig) -> Self {
        Self {
            includes: config.ranges.clone(),
            excludes: config.excludes.clone(),
        }
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Every in-scope target: concrete addresses, plus IPv6 networks kept
    /// whole.
    ///
    /// Specs that fail to expand are skipped on both lists; a partially
    /// broken scope still yields the targets it can describe. Excludes are
    /// applied with the same containment test as [`is_in_scope`], so an
    /// exclude network removes every address it contains even when it
    /// cannot be enumerated itself. An IPv6 network overlapping any
    /// exclude is dropped whole.
    ///
    /// [`is_in_scope`]: Self::is_in_scope
    pub fn enumerate_in_scope(&self) -> BTreeSet<ScopeTarget> {
        let excludes = ExcludeSet::new(&self.excludes);
        let mut targets = BTreeSet::new();
        for spec in &self.includes {
            match range::expand(spec) {
                Ok(expanded) => targets.extend(expanded),
                Err(e) => tracing::debug!(error = %e, "Skipping unexpandable scope entry"),
            }
        }
        targets.retain(|target| !excludes.covers(target));
        targets
    }

    /// The concrete addresses of [`enumerate_in_scope`](Self::enumerate_in_scope).
    pub fn in_scope_addresses(&self) -> BTreeSet<IpAddr> {
        self.enumerate_in_scope()
            .iter()
            .filter_map(ScopeTarget::address)
            .collect()
    }

    /// Whether `address` is matched by an include and by no exclude.
    pub fn is_in_scope(&self, address: &str) -> bool {
        let included = self
            .includes
            .iter()
            .any(|entry| range_contains(entry, address));
        if !included {
            return false;
        }
        !self
            .excludes
            .iter()
            .any(|entry| range_contains(entry, address))
    }

    pub fn is_ip_in_scope(&self, ip: IpAddr) -> bool {
        self.is_in_scope(&ip.to_string())
    }
}

/// Exclude entries prepared for repeated membership tests.
struct ExcludeSet {
    networks: Vec<IpNet>,
    addresses: BTreeSet<IpAddr>,
}

impl ExcludeSet {
    fn new(specs: &[String]) -> Self {
        let mut networks = Vec::new();
        let mut addresses = BTreeSet::new();
        for spec in specs {
            if let Some(net) = parse_network(spec.trim()) {
                networks.push(net);
                continue;
            }
            match range::expand(spec) {
                Ok(expanded) => {
                    addresses.extend(expanded.iter().filter_map(ScopeTarget::address))
                }
                Err(e) => tracing::debug!(error = %e, "Skipping unexpandable exclude entry"),
            }
        }
        Self {
            networks,
            addresses,
        }
    }

    /// An address is covered when any exclude contains it. A network is
    /// covered when any excluded address or network overlaps it, since it
    /// is handed on whole and cannot be split.
    fn covers(&self, target: &ScopeTarget) -> bool {
        match target {
            ScopeTarget::Addr(ip) => {
                self.addresses.contains(ip) || self.networks.iter().any(|n| n.contains(ip))
            }
            ScopeTarget::Net(net) => {
                self.networks
                    .iter()
                    .any(|n| n.contains(net) || net.contains(n))
                    || self.addresses.iter().any(|ip| net.contains(ip))
            }
        }
    }
}

/// Whether `entry` (a network, a single address, or an nmap-style range)
/// covers `address`.
fn range_contains(entry: &str, address: &str) -> bool {
    let entry = entry.trim();
    let address = address.trim();
    if entry == address {
        return true;
    }

    if let Some(net) = parse_network(entry) {
        return match address.parse::<IpAddr>() {
            Ok(ip) => net.contains(&ip),
            Err(_) => false,
        };
    }

    let Ok(ip) = address.parse::<IpAddr>() else {
        return false;
    };
    match range::expand(entry) {
        Ok(ips) => ips.contains(&ScopeTarget::Addr(ip)),
        Err(_) => false,
    }
}

/// Parse a CIDR block, or a bare address as a single-host network.
fn parse_network(entry: &str) -> Option<IpNet> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Some(net);
    }
    let ip = entry.parse::<IpAddr>().ok()?;
    let prefix = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(ip, prefix).ok()
}
