//! Fixed-window request limiting per client IP.
//!
//! One counter per client, stored in the cache under `rate_limit_<ip>` with
//! a TTL of one window. Bursts of up to twice the limit are possible across
//! a window boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;

use crate::cache::{sanitize_key, CacheResult, CacheStore, CacheWrite};
use crate::clock::Clock;
use crate::config::RequestLimitConfig;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow { count: u64 },
    Deny { count: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow { .. })
    }
}

/// Counter stored per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub count: u64,
    pub window_start: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    max_requests: u64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: &RequestLimitConfig,
    ) -> Self {
        Self {
            cache,
            clock,
            max_requests: config.max_requests,
            window_secs: config.window_secs,
        }
    }

    pub fn key(client_ip: IpAddr) -> String {
        sanitize_key(&format!("rate_limit_{client_ip}"))
    }

    /// Count a request from `client_ip` and decide whether it may proceed.
    ///
    /// A stored window older than the window length is treated as expired
    /// even if the backend has not dropped it yet.
    pub fn check(&self, client_ip: IpAddr) -> CacheResult<RateDecision> {
        let now = self.clock.now_unix_sec();
        let (max_requests, window_secs) = (self.max_requests, self.window_secs);
        let mut decision = RateDecision::Allow { count: 1 };

        self.cache.compute(&Self::key(client_ip), &mut |current: Option<&Value>| {
            let live = current
                .and_then(|value| serde_json::from_value::<RateWindow>(value.clone()).ok())
                .filter(|window| now.saturating_sub(window.window_start) <= window_secs);

            let next = match live {
                None => RateWindow {
                    count: 1,
                    window_start: now,
                },
                Some(window) if window.count >= max_requests => {
                    decision = RateDecision::Deny {
                        count: window.count,
                    };
                    return None;
                }
                Some(window) => RateWindow {
                    count: window.count + 1,
                    window_start: window.window_start,
                },
            };

            decision = RateDecision::Allow { count: next.count };
            let elapsed = now.saturating_sub(next.window_start);
            let ttl = window_secs.saturating_sub(elapsed).max(1);
            serde_json::to_value(next)
                .ok()
                .map(|value| CacheWrite::new(value, Some(ttl)))
        })?;

        if let RateDecision::Deny { count } = decision {
            tracing::warn!(client_ip = %client_ip, count, "Rate limit exceeded");
        }
        Ok(decision)
    }
}
