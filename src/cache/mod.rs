//! Key-value cache collaborator.
//!
//! # Data Flow
//! ```text
//! account_lock.rs  → locked_account_* / locked_ip_* entries (TTL = lock)
//! rate_limit.rs    → rate_limit_* windows (compute, TTL = window)
//! csrf.rs          → csrf_* tokens (take, TTL = 600s)
//! ```
//!
//! # Design Decisions
//! - Values are JSON documents; components keep typed structs and go through
//!   [`CacheStoreExt`] for (de)serialization
//! - Read-modify-write goes through [`CacheStore::compute`] and
//!   fetch-and-delete through [`CacheStore::take`], so stores with native
//!   atomic primitives can close the races between concurrent requests
//! - Backend failures surface as [`CacheError`]; nothing retries

pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use memory::MemoryCache;

/// Errors raised by a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cached value under `{key}` has an unexpected shape")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for `{key}` could not be encoded")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A replacement value produced inside [`CacheStore::compute`].
#[derive(Debug, Clone)]
pub struct CacheWrite {
    pub value: Value,
    /// Time to live in seconds; `None` keeps the entry until deleted.
    pub ttl_secs: Option<u64>,
}

impl CacheWrite {
    pub fn new(value: Value, ttl_secs: Option<u64>) -> Self {
        Self { value, ttl_secs }
    }
}

/// Key-value store with per-entry TTL.
pub trait CacheStore: Send + Sync {
    fn has(&self, key: &str) -> CacheResult<bool>;

    fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    fn set(&self, key: &str, value: Value, ttl_secs: Option<u64>) -> CacheResult<()>;

    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Fetch and remove `key` in one step.
    ///
    /// The default is a get followed by a delete; backends with an atomic
    /// primitive (GETDEL, a remove returning the old value) should override it.
    fn take(&self, key: &str) -> CacheResult<Option<Value>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.delete(key)?;
        }
        Ok(value)
    }

    /// Read-modify-write of a single key.
    ///
    /// `f` sees the live value (expired entries read as `None`) and returns
    /// the replacement, or `None` to leave the entry untouched. The default is
    /// not atomic; backends should override it with a compare-and-swap or a
    /// scripted update.
    fn compute(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&Value>) -> Option<CacheWrite>,
    ) -> CacheResult<()> {
        let current = self.get(key)?;
        if let Some(write) = f(current.as_ref()) {
            self.set(key, write.value, write.ttl_secs)?;
        }
        Ok(())
    }
}

/// Typed helpers over any [`CacheStore`].
pub trait CacheStoreExt: CacheStore {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| CacheError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> CacheResult<()> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set(key, value, ttl_secs)
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
///
/// Cache keys embed client-controlled values (IPs, user ids); sanitizing keeps
/// them valid for any backend and stops one key from aliasing a namespace.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_key("locked_ip_192.168.1.5"), "locked_ip_192_168_1_5");
        assert_eq!(sanitize_key("rate_limit_2001:db8::1"), "rate_limit_2001_db8__1");
        assert_eq!(sanitize_key("plain_key_09"), "plain_key_09");
    }

    #[test]
    fn sanitize_handles_unicode() {
        assert_eq!(sanitize_key("locked_account_ü"), "locked_account__");
    }
}
