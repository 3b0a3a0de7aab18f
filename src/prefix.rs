//! Prefix utilities: CIDR parsing, containment and the official prefix coverage check.
use crate::RouteEntry;
use ipnet::IpNet;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Address family of a prefix.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "v4")]
    V4,
    #[serde(rename = "v6")]
    V6,
}

impl AddressFamily {
    /// Classify a prefix string by the presence of a colon.
    ///
    /// This does not validate the prefix; it only needs to be cheap enough to run on
    /// every entry of the global table.
    pub fn of_prefix_str(prefix: &str) -> Self {
        match prefix.contains(':') {
            true => AddressFamily::V6,
            false => AddressFamily::V4,
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "v4"),
            AddressFamily::V6 => write!(f, "v6"),
        }
    }
}

/// Mask length parsed from the suffix after `/`, 0 when missing or invalid.
pub fn mask_len(prefix: &str) -> u8 {
    prefix
        .rsplit_once('/')
        .and_then(|(_, len)| len.trim().parse::<u8>().ok())
        .unwrap_or(0)
}

/// Parse a CIDR string into its canonical (host bits cleared) network.
///
/// A bare address is treated as a host route (`/32` or `/128`).
pub fn parse_prefix(prefix: &str) -> Option<IpNet> {
    let prefix = prefix.trim();
    let net = match prefix.parse::<IpNet>() {
        Ok(net) => net,
        Err(_) => IpNet::from(prefix.parse::<std::net::IpAddr>().ok()?),
    };
    Some(net.trunc())
}

/// Whether `outer` covers `inner`. Prefixes of different families never contain each other.
pub fn contains(outer: &IpNet, inner: &IpNet) -> bool {
    outer.contains(inner)
}

/// Whether the CIDR string `outer` covers the CIDR string `inner`.
pub fn contains_str(outer: &str, inner: &str) -> bool {
    match (parse_prefix(outer), parse_prefix(inner)) {
        (Some(o), Some(i)) => contains(&o, &i),
        _ => false,
    }
}

/// How an official prefix shows up in the routing table.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    /// The exact network is announced.
    Exact,
    /// Only more-specific networks inside it are announced.
    Deaggregated,
    NotFound,
}

/// Coverage of the official prefix list by the announced routes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrefixCoverage {
    pub total: usize,
    pub exact: usize,
    pub deaggregated: usize,
    pub not_found: usize,
    /// Official prefixes with no covering announcement.
    pub missing: Vec<String>,
}

/// Classify a single official prefix against a set of announced networks.
pub fn classify_prefix(official: &IpNet, announced: &[IpNet]) -> CoverageStatus {
    if announced.iter().any(|a| a == official) {
        return CoverageStatus::Exact;
    }
    if announced.iter().any(|a| official.contains(a)) {
        return CoverageStatus::Deaggregated;
    }
    CoverageStatus::NotFound
}

/// Cross-check official prefixes against the routes announced by the target network.
///
/// Unparseable official prefixes are counted as not found.
pub fn check_coverage(official: &[String], routes: &[&RouteEntry]) -> PrefixCoverage {
    let announced: Vec<IpNet> = routes
        .iter()
        .filter_map(|r| parse_prefix(r.prefix.as_str()))
        .unique()
        .collect();

    let mut coverage = PrefixCoverage {
        total: official.len(),
        exact: 0,
        deaggregated: 0,
        not_found: 0,
        missing: vec![],
    };

    for prefix in official {
        let status = match parse_prefix(prefix) {
            Some(net) => classify_prefix(&net, &announced),
            None => CoverageStatus::NotFound,
        };
        match status {
            CoverageStatus::Exact => coverage.exact += 1,
            CoverageStatus::Deaggregated => coverage.deaggregated += 1,
            CoverageStatus::NotFound => {
                coverage.not_found += 1;
                coverage.missing.push(prefix.clone());
            }
        }
    }

    coverage
}
