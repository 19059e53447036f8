//! Request origin tier.
//!
//! Merges the IP class and the caller URL class into one tier. The more
//! restrictive signal always wins.

use serde::{Deserialize, Serialize};

use crate::net::IpType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginTier {
    Local,
    Internal,
    Public,
    Unknown,
}

impl OriginTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginTier::Local => "local",
            OriginTier::Internal => "internal",
            OriginTier::Public => "public",
            OriginTier::Unknown => "unknown",
        }
    }

    /// Parse a tier recorded in the security stream. Anything else is unknown.
    pub fn parse(value: &str) -> Self {
        match value {
            "local" => OriginTier::Local,
            "internal" => OriginTier::Internal,
            "public" => OriginTier::Public,
            _ => OriginTier::Unknown,
        }
    }
}

impl From<IpType> for OriginTier {
    fn from(value: IpType) -> Self {
        match value {
            IpType::Local => OriginTier::Local,
            IpType::Internal => OriginTier::Internal,
            IpType::Public => OriginTier::Public,
        }
    }
}

/// local if either side is local, internal if either is internal, public
/// only when both are public, unknown otherwise.
pub fn resolve(ip_type: OriginTier, url_type: OriginTier) -> OriginTier {
    use OriginTier::*;
    match (ip_type, url_type) {
        (Local, _) | (_, Local) => Local,
        (Internal, _) | (_, Internal) => Internal,
        (Public, Public) => Public,
        _ => Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OriginTier::*;

    #[test]
    fn test_resolution_table() {
        assert_eq!(resolve(Local, Public), Local);
        assert_eq!(resolve(Public, Local), Local);
        assert_eq!(resolve(Internal, Internal), Internal);
        assert_eq!(resolve(Public, Internal), Internal);
        assert_eq!(resolve(Public, Public), Public);
        assert_eq!(resolve(Unknown, Unknown), Unknown);
        assert_eq!(resolve(Public, Unknown), Unknown);
        assert_eq!(resolve(Unknown, Internal), Internal);
    }

    #[test]
    fn test_resolution_is_symmetric() {
        let all = [Local, Internal, Public, Unknown];
        for a in all {
            for b in all {
                assert_eq!(resolve(a, b), resolve(b, a), "{a:?} / {b:?}");
            }
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for tier in [Local, Internal, Public, Unknown] {
            assert_eq!(OriginTier::parse(tier.as_str()), tier);
        }
        assert_eq!(OriginTier::parse("garbage"), Unknown);
    }
}
