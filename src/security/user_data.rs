//! Best-effort client enrichment: geo location, device and client headers.
//!
//! Nothing here is a trust decision. Lookups that fail degrade to
//! `Unknown` values instead of failing the request.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::net::IpType;
use crate::security::csrf::ClientFingerprint;

pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_COUNTRY: &str = "XX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub ip: String,
    pub country: String,
    pub country_code: String,
    pub city: String,
}

/// Source of geo data for public addresses.
pub trait GeoLocator: Send + Sync {
    /// `None` when the address is not known to the locator.
    fn locate(&self, ip: IpAddr) -> Option<GeoInfo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Desktop,
    Mobile,
    Tablet,
    Robot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub kind: DeviceKind,
    pub is_robot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHeaders {
    pub user_agent: String,
    pub referer: String,
    pub accept_language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub geo: GeoInfo,
    pub device: DeviceInfo,
    pub client: ClientHeaders,
}

impl UserData {
    pub fn fingerprint(&self) -> ClientFingerprint {
        ClientFingerprint {
            ip: self.geo.ip.clone(),
            country_code: self.geo.country_code.clone(),
            is_robot: self.device.is_robot,
            user_agent: self.client.user_agent.clone(),
        }
    }
}

/// Geo data for `ip`. Non-public addresses never reach the locator.
pub fn geo_info(ip: IpAddr, ip_type: IpType, locator: Option<&dyn GeoLocator>) -> GeoInfo {
    if ip_type != IpType::Public {
        return GeoInfo {
            ip: ip.to_string(),
            country: "Local Network".to_string(),
            country_code: UNKNOWN_COUNTRY.to_string(),
            city: "Local Network".to_string(),
        };
    }
    locator
        .and_then(|locator| locator.locate(ip))
        .unwrap_or_else(|| GeoInfo {
            ip: ip.to_string(),
            country: UNKNOWN.to_string(),
            country_code: UNKNOWN_COUNTRY.to_string(),
            city: UNKNOWN.to_string(),
        })
}

const ROBOT_MARKERS: &[&str] = &[
    "bot", "crawl", "spider", "slurp", "curl", "wget", "python-requests", "httpclient",
    "headless", "facebookexternalhit", "preview",
];

/// Rough user-agent classification.
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let ua = user_agent.to_ascii_lowercase();

    let is_robot = ua.is_empty() || ROBOT_MARKERS.iter().any(|marker| ua.contains(marker));

    // Order matters: Edge and Opera carry "chrome", Chrome carries "safari".
    let browser = [
        ("edg/", "Edge"),
        ("opr/", "Opera"),
        ("firefox/", "Firefox"),
        ("chrome/", "Chrome"),
        ("safari/", "Safari"),
        ("msie", "Internet Explorer"),
        ("trident/", "Internet Explorer"),
    ]
    .iter()
    .find(|(marker, _)| ua.contains(marker))
    .map(|(_, name)| name.to_string())
    .unwrap_or_else(|| UNKNOWN.to_string());

    let os = [
        ("windows", "Windows"),
        ("android", "Android"),
        ("iphone", "iOS"),
        ("ipad", "iOS"),
        ("mac os x", "macOS"),
        ("cros", "ChromeOS"),
        ("linux", "Linux"),
    ]
    .iter()
    .find(|(marker, _)| ua.contains(marker))
    .map(|(_, name)| name.to_string())
    .unwrap_or_else(|| UNKNOWN.to_string());

    let kind = if is_robot {
        DeviceKind::Robot
    } else if ua.contains("ipad") || ua.contains("tablet") {
        DeviceKind::Tablet
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        DeviceKind::Mobile
    } else {
        DeviceKind::Desktop
    };

    DeviceInfo {
        browser,
        os,
        kind,
        is_robot,
    }
}

pub fn client_headers(headers: &HeaderMap) -> ClientHeaders {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    ClientHeaders {
        user_agent: read("user-agent"),
        referer: read("referer"),
        accept_language: read("accept-language"),
    }
}

pub fn collect(
    ip: IpAddr,
    ip_type: IpType,
    headers: &HeaderMap,
    locator: Option<&dyn GeoLocator>,
) -> UserData {
    let client = client_headers(headers);
    UserData {
        geo: geo_info(ip, ip_type, locator),
        device: parse_user_agent(&client.user_agent),
        client,
    }
}
