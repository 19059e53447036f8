//! Ordered accumulator of check results for one request.

use serde::Serialize;
use serde_json::{Map, Value};
use std::net::IpAddr;

use crate::net::IpType;
use crate::security::origin::OriginTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Successful,
    Unsuccessful,
    /// The check did not run for this request (e.g. whitelisted client).
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityCheckResult {
    pub name: String,
    pub passed: bool,
    pub status: CheckStatus,
    pub data: Map<String, Value>,
}

impl SecurityCheckResult {
    pub fn success(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            status: CheckStatus::Successful,
            data: Map::new(),
        }
    }

    pub fn failure(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            status: CheckStatus::Unsuccessful,
            data: Map::new(),
        }
    }

    pub fn ignored(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            status: CheckStatus::Ignore,
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Results in the order the checks ran. Later checks read earlier results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityStream {
    results: Vec<SecurityCheckResult>,
}

impl SecurityStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result; a second result under the same name replaces the first.
    pub fn push(&mut self, result: SecurityCheckResult) {
        match self.results.iter_mut().find(|r| r.name == result.name) {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SecurityCheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn data(&self, name: &str, key: &str) -> Option<&Value> {
        self.get(name).and_then(|r| r.data.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityCheckResult> {
        self.results.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether the ip check found the client on the whitelist.
    pub fn in_whitelist(&self) -> bool {
        self.data("ip", "in_whitelist")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Client address recorded by the ip check.
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.data("ip", "client_ip")
            .and_then(Value::as_str)
            .and_then(|ip| ip.parse().ok())
    }

    pub fn ip_type(&self) -> OriginTier {
        self.tier("ip", "ip_type")
    }

    pub fn url_type(&self) -> OriginTier {
        self.tier("url", "url_type")
    }

    fn tier(&self, name: &str, key: &str) -> OriginTier {
        self.data(name, key)
            .and_then(Value::as_str)
            .map(OriginTier::parse)
            .unwrap_or(OriginTier::Unknown)
    }

    /// Helper used by the url check before the ip class is known.
    pub fn ip_class(&self) -> Option<IpType> {
        match self.ip_type() {
            OriginTier::Local => Some(IpType::Local),
            OriginTier::Internal => Some(IpType::Internal),
            OriginTier::Public => Some(IpType::Public),
            OriginTier::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_is_preserved() {
        let mut stream = SecurityStream::new();
        stream.push(SecurityCheckResult::success("ip"));
        stream.push(SecurityCheckResult::ignored("request_limit"));
        stream.push(SecurityCheckResult::failure("xss"));
        assert_eq!(stream.names(), vec!["ip", "request_limit", "xss"]);
        assert_eq!(stream.get("xss").map(|r| r.passed), Some(false));
    }

    #[test]
    fn test_ip_helpers() {
        let mut stream = SecurityStream::new();
        assert!(!stream.in_whitelist());
        assert_eq!(stream.ip_type(), OriginTier::Unknown);

        stream.push(
            SecurityCheckResult::success("ip")
                .with("client_ip", "10.0.0.7")
                .with("ip_type", "internal")
                .with("in_whitelist", true),
        );
        assert!(stream.in_whitelist());
        assert_eq!(stream.client_ip(), Some("10.0.0.7".parse().unwrap()));
        assert_eq!(stream.ip_type(), OriginTier::Internal);
        assert_eq!(stream.ip_class(), Some(IpType::Internal));
    }

    #[test]
    fn test_serializes_with_status() {
        let result = SecurityCheckResult::ignored("csrf");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"name": "csrf", "passed": true, "status": "ignore", "data": {}})
        );
    }

    #[test]
    fn test_push_replaces_same_name() {
        let mut stream = SecurityStream::new();
        stream.push(SecurityCheckResult::failure("ip"));
        stream.push(SecurityCheckResult::success("ip"));
        assert_eq!(stream.len(), 1);
        assert!(stream.get("ip").unwrap().passed);
    }
}
