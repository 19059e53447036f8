//! IP classification, allow/deny lists and client IP resolution.
//!
//! # Responsibilities
//! - Classify an address as local, internal or public
//! - Match addresses against exact entries and CIDR ranges
//! - Pick the client address out of proxy headers and the socket address

use axum::http::HeaderMap;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::IpConfig;

/// Proxy headers consulted for client candidates, in priority order.
pub const CLIENT_IP_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "client-ip",
    "x-real-ip",
    "cf-connecting-ip",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
    "true-client-ip",
    "cf-pseudo-ipv4",
    "x-cluster-client-ip",
    "x-original-forwarded-for",
];

/// Network class of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    Local,
    Internal,
    Public,
}

impl IpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpType::Local => "local",
            IpType::Internal => "internal",
            IpType::Public => "public",
        }
    }
}

/// A list entry that is neither an address nor a CIDR range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{entry}` is not an IP address or CIDR range")]
pub struct IpRuleError {
    pub entry: String,
}

/// Parse `10.0.0.0/8`, `2001:db8::/32` or a bare address into a network.
///
/// Bare addresses become host routes (`/32`, `/128`).
pub fn parse_rule(entry: &str) -> Result<IpNet, IpRuleError> {
    let entry = entry.trim();
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    let host = match entry.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ipv4Net::new(v4, 32).ok().map(IpNet::V4),
        Ok(IpAddr::V6(v6)) => Ipv6Net::new(v6, 128).ok().map(IpNet::V6),
        Err(_) => None,
    };
    host.ok_or_else(|| IpRuleError {
        entry: entry.to_string(),
    })
}

/// Parse every entry, failing on the first bad one.
pub fn parse_rules(entries: &[String]) -> Result<Vec<IpNet>, IpRuleError> {
    entries.iter().map(|entry| parse_rule(entry)).collect()
}

/// Whether `ip` falls inside `cidr`.
///
/// Invalid ranges and mixed address families never match.
pub fn in_range(ip: IpAddr, cidr: &str) -> bool {
    parse_rule(cidr)
        .map(|net| net.contains(&ip.to_canonical()))
        .unwrap_or(false)
}

fn matches_any(ip: IpAddr, rules: &[IpNet]) -> bool {
    let ip = ip.to_canonical();
    rules.iter().any(|net| net.contains(&ip))
}

/// Classifies addresses against the configured ranges and lists.
#[derive(Debug, Clone)]
pub struct IpClassifier {
    local: Vec<IpNet>,
    internal: Vec<IpNet>,
    whitelist: Vec<IpNet>,
    blacklist: Vec<IpNet>,
}

impl IpClassifier {
    pub fn from_config(config: &IpConfig) -> Result<Self, IpRuleError> {
        Ok(Self {
            local: parse_rules(&config.local_ranges)?,
            internal: parse_rules(&config.internal_ranges)?,
            whitelist: parse_rules(&config.whitelist)?,
            blacklist: parse_rules(&config.blacklist)?,
        })
    }

    /// Loopback and unspecified addresses are always local; IPv4-mapped
    /// IPv6 addresses are classified as their IPv4 form.
    pub fn classify(&self, ip: IpAddr) -> IpType {
        let ip = ip.to_canonical();
        if ip.is_loopback() || ip.is_unspecified() || matches_any(ip, &self.local) {
            IpType::Local
        } else if matches_any(ip, &self.internal) {
            IpType::Internal
        } else {
            IpType::Public
        }
    }

    pub fn is_whitelisted(&self, ip: IpAddr) -> bool {
        matches_any(ip, &self.whitelist)
    }

    pub fn is_blacklisted(&self, ip: IpAddr) -> bool {
        matches_any(ip, &self.blacklist)
    }

    /// Pick the client address.
    ///
    /// Order of preference: first public IPv4 candidate, first public
    /// candidate of any family, first internal or local candidate. With no
    /// candidate at all the result is loopback when the remote address is
    /// missing or local, `0.0.0.0` otherwise.
    pub fn resolve_client_ip(&self, headers: &HeaderMap, remote: Option<IpAddr>) -> IpAddr {
        let candidates = collect_candidates(headers, remote);

        let public = |ip: &&IpAddr| self.classify(**ip) == IpType::Public;
        if let Some(ip) = candidates.iter().filter(public).find(|ip| ip.is_ipv4()) {
            return *ip;
        }
        if let Some(ip) = candidates.iter().find(public) {
            return *ip;
        }
        if let Some(ip) = candidates.first() {
            return *ip;
        }

        match remote {
            Some(ip) if self.classify(ip) != IpType::Local => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// Valid addresses from the proxy headers then the remote address,
/// de-duplicated in first-seen order.
pub fn collect_candidates(headers: &HeaderMap, remote: Option<IpAddr>) -> Vec<IpAddr> {
    let mut candidates: Vec<IpAddr> = Vec::new();
    let mut push = |ip: IpAddr| {
        let ip = ip.to_canonical();
        if !candidates.contains(&ip) {
            candidates.push(ip);
        }
    };

    for name in CLIENT_IP_HEADERS {
        for value in headers.get_all(*name) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for part in value.split(',') {
                if let Some(ip) = parse_candidate(part) {
                    push(ip);
                }
            }
        }
    }
    if let Some(ip) = remote {
        push(ip);
    }
    candidates
}

/// Parse one comma-separated header element.
///
/// Accepts bare addresses, `addr:port`, `[v6]:port` and RFC 7239
/// `for=` pairs.
fn parse_candidate(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    let value = raw
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            pair.get(..4)
                .filter(|prefix| prefix.eq_ignore_ascii_case("for="))
                .map(|_| &pair[4..])
        })
        .unwrap_or(raw);
    let value = value.trim().trim_matches('"');

    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    value
        .strip_prefix('[')
        .and_then(|rest| rest.split(']').next())
        .and_then(|inner| inner.parse::<IpAddr>().ok())
}
