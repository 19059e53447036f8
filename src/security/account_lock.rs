//! Account and IP lockout.
//!
//! # Responsibilities
//! - Lock an account or an IP for a fixed TTL
//! - Answer whether a key is currently locked
//! - Count failed attempts and lock once the threshold is reached
//!
//! # Design Decisions
//! - A lock only ends by TTL expiry; there is no unlock operation
//! - Whitelisted IPs are never locked in IP scope
//! - The rejection message is derived from the remaining lock time

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::{sanitize_key, CacheResult, CacheStore, CacheStoreExt, CacheWrite};
use crate::clock::Clock;
use crate::config::AccountConfig;

/// Status returned for requests from a locked account or IP.
pub const LOCK_STATUS: StatusCode = StatusCode::UNAUTHORIZED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockScope {
    Account,
    Ip,
}

impl LockScope {
    fn prefix(&self) -> &'static str {
        match self {
            LockScope::Account => "locked_account_",
            LockScope::Ip => "locked_ip_",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            LockScope::Account => "account",
            LockScope::Ip => "ip",
        }
    }
}

/// A lock as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub scope: LockScope,
    pub key: String,
    pub locked_from: u64,
    pub locked_until: u64,
}

/// Cache key of a lock: scope prefix plus key, sanitized.
pub fn lock_key(scope: LockScope, key: &str) -> String {
    sanitize_key(&format!("{}{}", scope.prefix(), key))
}

/// Human-readable lock message for a lock lasting `ttl_secs` more seconds.
pub fn lock_message(ttl_secs: u64) -> String {
    let wait = if ttl_secs < 3_600 {
        format!("{} minutes", ttl_secs / 60)
    } else if ttl_secs < 86_400 {
        format!("{} hours", ttl_secs / 3_600)
    } else {
        format!("{} days, {} hours", ttl_secs / 86_400, (ttl_secs % 86_400) / 3_600)
    };
    format!(
        "Access denied: Your account is locked due to too many failed login attempts. \
         Please try again after {wait}."
    )
}

#[derive(Clone)]
pub struct AccountLockGuard {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
}

impl AccountLockGuard {
    pub fn new(cache: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: &AccountConfig) -> Self {
        Self {
            cache,
            clock,
            ttl_secs: config.ttl_secs,
        }
    }

    /// Lock `key` for the configured TTL.
    pub fn lock(&self, scope: LockScope, key: &str) -> CacheResult<LockEntry> {
        let now = self.clock.now_unix_sec();
        let entry = LockEntry {
            scope,
            key: key.to_string(),
            locked_from: now,
            locked_until: now.saturating_add(self.ttl_secs),
        };
        self.cache
            .set_as(&lock_key(scope, key), &entry, Some(self.ttl_secs))?;
        tracing::warn!(
            scope = scope.as_str(),
            key = %key,
            ttl_secs = self.ttl_secs,
            "Lock applied"
        );
        Ok(entry)
    }

    /// Lock unless this is an IP-scope lock for a whitelisted client.
    pub fn lock_for_request(
        &self,
        scope: LockScope,
        key: &str,
        in_whitelist: bool,
    ) -> CacheResult<Option<LockEntry>> {
        if scope == LockScope::Ip && in_whitelist {
            tracing::debug!(key = %key, "Whitelisted IP exempt from lock");
            return Ok(None);
        }
        self.lock(scope, key).map(Some)
    }

    pub fn is_locked(&self, scope: LockScope, key: &str) -> CacheResult<bool> {
        self.cache.has(&lock_key(scope, key))
    }

    /// The live lock for `key`, if any.
    pub fn lock_entry(&self, scope: LockScope, key: &str) -> CacheResult<Option<LockEntry>> {
        self.cache.get_as(&lock_key(scope, key))
    }

    /// Rejection message for a locked key, based on the time left.
    pub fn rejection_message(&self, scope: LockScope, key: &str) -> CacheResult<String> {
        let now = self.clock.now_unix_sec();
        let remaining = self
            .lock_entry(scope, key)?
            .map(|entry| entry.locked_until.saturating_sub(now))
            .unwrap_or(self.ttl_secs);
        Ok(lock_message(remaining))
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub attempts: u64,
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct AttemptWindow {
    count: u64,
    window_start: u64,
}

/// Failed-attempt counter feeding [`AccountLockGuard`].
#[derive(Clone)]
pub struct LoginAttempts {
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    guard: AccountLockGuard,
    max_attempts: u64,
    window_secs: u64,
}

impl LoginAttempts {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        guard: AccountLockGuard,
        config: &AccountConfig,
    ) -> Self {
        Self {
            cache,
            clock,
            guard,
            max_attempts: config.max_attempts,
            window_secs: config.attempt_window_secs,
        }
    }

    fn attempts_key(scope: LockScope, key: &str) -> String {
        sanitize_key(&format!("login_attempts_{}_{}", scope.as_str(), key))
    }

    /// Count one failure; lock once `max_attempts` is reached.
    pub fn record_failure(
        &self,
        scope: LockScope,
        key: &str,
        in_whitelist: bool,
    ) -> CacheResult<AttemptOutcome> {
        let now = self.clock.now_unix_sec();
        let window_secs = self.window_secs;
        let mut attempts = 0;

        self.cache
            .compute(&Self::attempts_key(scope, key), &mut |current: Option<&Value>| {
                let window = current
                    .and_then(|value| serde_json::from_value::<AttemptWindow>(value.clone()).ok())
                    .filter(|window| now.saturating_sub(window.window_start) < window_secs)
                    .map(|window| AttemptWindow {
                        count: window.count + 1,
                        window_start: window.window_start,
                    })
                    .unwrap_or(AttemptWindow {
                        count: 1,
                        window_start: now,
                    });
                attempts = window.count;
                let ttl = window_secs
                    .saturating_sub(now.saturating_sub(window.window_start))
                    .max(1);
                Some(CacheWrite::new(
                    json!({"count": window.count, "window_start": window.window_start}),
                    Some(ttl),
                ))
            })?;

        let mut locked = false;
        if attempts >= self.max_attempts {
            locked = self.guard.lock_for_request(scope, key, in_whitelist)?.is_some();
            self.reset(scope, key)?;
        }
        Ok(AttemptOutcome { attempts, locked })
    }

    /// Forget recorded failures, e.g. after a successful login.
    pub fn reset(&self, scope: LockScope, key: &str) -> CacheResult<()> {
        self.cache.delete(&Self::attempts_key(scope, key))
    }

    pub fn attempts(&self, scope: LockScope, key: &str) -> CacheResult<u64> {
        Ok(self
            .cache
            .get_as::<AttemptWindow>(&Self::attempts_key(scope, key))?
            .map(|window| window.count)
            .unwrap_or(0))
    }
}
