//! Single-use CSRF tokens bound to a client fingerprint.
//!
//! # Responsibilities
//! - Issue 256-bit random tokens stored under `csrf_<token>` for 600 seconds
//! - Validate a token once: the cache entry is taken atomically, then the
//!   stored fingerprint hash is compared in constant time
//!
//! # Design Decisions
//! - The fingerprint uses semi-stable client signals (IP, country, robot
//!   flag, user agent) instead of session state
//! - Malformed, missing, expired and mismatching tokens all fail closed

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::cache::{CacheError, CacheResult, CacheStore, CacheStoreExt};
use crate::clock::Clock;
use crate::config::CsrfConfig;

const TOKEN_BYTES: usize = 32;

/// Client signals a token is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientFingerprint {
    pub ip: String,
    pub country_code: String,
    pub is_robot: bool,
    pub user_agent: String,
}

impl ClientFingerprint {
    /// SHA-256 of `ip|country_code|is_robot|user_agent`, hex encoded.
    pub fn hash(&self) -> String {
        let joined = format!(
            "{}|{}|{}|{}",
            self.ip,
            self.country_code,
            if self.is_robot { "1" } else { "0" },
            self.user_agent
        );
        hex::encode(Sha256::digest(joined.as_bytes()))
    }
}

/// Cached token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfRecord {
    pub context: String,
    pub time_create: u64,
}

#[derive(Clone)]
pub struct CsrfGuard {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
}

impl CsrfGuard {
    pub fn new(cache: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: &CsrfConfig) -> Self {
        Self {
            cache,
            clock,
            ttl_secs: config.ttl_secs,
        }
    }

    fn key(token: &str) -> String {
        format!("csrf_{token}")
    }

    /// Issue a fresh token for `fingerprint`.
    pub fn issue(&self, fingerprint: &ClientFingerprint) -> CacheResult<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let record = CsrfRecord {
            context: fingerprint.hash(),
            time_create: self.clock.now_unix_sec(),
        };
        self.cache
            .set_as(&Self::key(&token), &record, Some(self.ttl_secs))?;
        Ok(token)
    }

    /// Validate and consume `token`.
    ///
    /// The entry is removed even when the fingerprint does not match.
    pub fn validate(&self, token: &str, fingerprint: &ClientFingerprint) -> CacheResult<bool> {
        if !is_well_formed(token) {
            return Ok(false);
        }
        let key = Self::key(token);
        let Some(stored) = self.cache.take(&key)? else {
            return Ok(false);
        };
        let record: CsrfRecord =
            serde_json::from_value(stored).map_err(|source| CacheError::Decode { key, source })?;

        let expected = fingerprint.hash();
        Ok(constant_time_eq(expected.as_bytes(), record.context.as_bytes()))
    }
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;

    fn guard() -> (CsrfGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        (CsrfGuard::new(cache, clock.clone(), &CsrfConfig::default()), clock)
    }

    fn browser() -> ClientFingerprint {
        ClientFingerprint {
            ip: "203.0.113.9".to_string(),
            country_code: "DE".to_string(),
            is_robot: false,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".to_string(),
        }
    }

    #[test]
    fn test_token_shape() {
        let (guard, _) = guard();
        let token = guard.issue(&browser()).unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(token, guard.issue(&browser()).unwrap());
    }

    #[test]
    fn test_validates_exactly_once() {
        let (guard, _) = guard();
        let token = guard.issue(&browser()).unwrap();
        assert!(guard.validate(&token, &browser()).unwrap());
        assert!(!guard.validate(&token, &browser()).unwrap());
    }

    #[test]
    fn test_other_fingerprint_fails_and_burns_token() {
        let (guard, _) = guard();
        let token = guard.issue(&browser()).unwrap();

        let mut other = browser();
        other.user_agent = "curl/8.5.0".to_string();
        assert!(!guard.validate(&token, &other).unwrap());
        assert!(!guard.validate(&token, &browser()).unwrap());
    }

    #[test]
    fn test_expired_token_fails() {
        let (guard, clock) = guard();
        let token = guard.issue(&browser()).unwrap();
        clock.advance(600);
        assert!(!guard.validate(&token, &browser()).unwrap());
    }

    #[test]
    fn test_malformed_token_fails() {
        let (guard, _) = guard();
        assert!(!guard.validate("", &browser()).unwrap());
        assert!(!guard.validate("../../etc/passwd", &browser()).unwrap());
        assert!(!guard.validate(&"z".repeat(64), &browser()).unwrap());
    }

    #[test]
    fn test_fingerprint_hash_covers_every_signal() {
        let base = browser().hash();
        let mut robot = browser();
        robot.is_robot = true;
        let mut country = browser();
        country.country_code = "FR".to_string();
        assert_ne!(base, robot.hash());
        assert_ne!(base, country.hash());
        assert_eq!(base, browser().hash());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
