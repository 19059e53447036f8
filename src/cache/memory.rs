//! In-process cache backed by a sharded concurrent map.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{CacheResult, CacheStore, CacheWrite};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// Unix seconds after which the entry is gone.
    expires_at: Option<u64>,
}

impl CacheEntry {
    fn new(value: Value, ttl_secs: Option<u64>, now: u64) -> Self {
        Self {
            value,
            expires_at: ttl_secs.map(|ttl| now.saturating_add(ttl)),
        }
    }

    fn is_expired(&self, now: u64) -> bool {
        // An entry is live for exactly `ttl` seconds.
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A thread-safe TTL cache.
///
/// `compute` and `take` run under the shard lock of the key, which makes the
/// rate-limiter increment and CSRF fetch-and-delete atomic for this backend.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_unix_sec();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Remaining lifetime of `key` in seconds, `None` if absent or unbounded.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_unix_sec();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_sub(now))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCache {
    fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = self.clock.now_unix_sec();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Value, ttl_secs: Option<u64>) -> CacheResult<()> {
        let now = self.clock.now_unix_sec();
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl_secs, now));
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn take(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = self.clock.now_unix_sec();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value))
    }

    fn compute(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&Value>) -> Option<CacheWrite>,
    ) -> CacheResult<()> {
        let now = self.clock.now_unix_sec();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let expired = occupied.get().is_expired(now);
                let write = {
                    let current = if expired { None } else { Some(&occupied.get().value) };
                    f(current)
                };
                match write {
                    Some(write) => {
                        occupied.insert(CacheEntry::new(write.value, write.ttl_secs, now));
                    }
                    None if expired => {
                        occupied.remove();
                    }
                    None => {}
                }
            }
            Entry::Vacant(vacant) => {
                if let Some(write) = f(None) {
                    vacant.insert(CacheEntry::new(write.value, write.ttl_secs, now));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStoreExt;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn cache_at(ts: u64) -> (MemoryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(ts));
        (MemoryCache::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_set_get_delete() {
        let (cache, _) = cache_at(1_000);
        assert!(!cache.has("k").unwrap());

        cache.set("k", json!({"a": 1}), None).unwrap();
        assert!(cache.has("k").unwrap());
        assert_eq!(cache.get("k").unwrap(), Some(json!({"a": 1})));

        cache.delete("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock) = cache_at(1_000);
        cache.set("k", json!(1), Some(60)).unwrap();

        clock.advance(59);
        assert!(cache.has("k").unwrap());
        assert_eq!(cache.ttl("k"), Some(1));

        clock.advance(1);
        assert!(!cache.has("k").unwrap());
        assert_eq!(cache.ttl("k"), None);
    }

    #[test]
    fn test_take_is_single_use() {
        let (cache, _) = cache_at(1_000);
        cache.set("token", json!("v"), Some(600)).unwrap();

        assert_eq!(cache.take("token").unwrap(), Some(json!("v")));
        assert_eq!(cache.take("token").unwrap(), None);
    }

    #[test]
    fn test_take_ignores_expired() {
        let (cache, clock) = cache_at(1_000);
        cache.set("token", json!("v"), Some(10)).unwrap();
        clock.advance(10);
        assert_eq!(cache.take("token").unwrap(), None);
    }

    #[test]
    fn test_compute_counts() {
        let (cache, _) = cache_at(1_000);
        for _ in 0..5 {
            cache
                .compute("counter", &mut |current| {
                    let next = current.and_then(Value::as_u64).unwrap_or(0) + 1;
                    Some(CacheWrite::new(json!(next), Some(60)))
                })
                .unwrap();
        }
        assert_eq!(cache.get("counter").unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_compute_sees_expired_as_missing() {
        let (cache, clock) = cache_at(1_000);
        cache.set("counter", json!(7), Some(5)).unwrap();
        clock.advance(5);

        let mut seen = Some(json!("sentinel"));
        cache
            .compute("counter", &mut |current| {
                seen = current.cloned();
                None
            })
            .unwrap();

        assert_eq!(seen, None);
        assert!(cache.is_empty(), "expired entry should be dropped");
    }

    #[test]
    fn test_concurrent_compute_is_atomic() {
        let cache = MemoryCache::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        cache
                            .compute("hits", &mut |current| {
                                let next = current.and_then(Value::as_u64).unwrap_or(0) + 1;
                                Some(CacheWrite::new(json!(next), None))
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.get("hits").unwrap(), Some(json!(2_000)));
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Window {
            count: u64,
        }

        let (cache, _) = cache_at(1_000);
        cache.set_as("w", &Window { count: 3 }, None).unwrap();
        assert_eq!(cache.get_as::<Window>("w").unwrap(), Some(Window { count: 3 }));

        cache.set("w", json!("not a window"), None).unwrap();
        assert!(matches!(
            cache.get_as::<Window>("w"),
            Err(crate::cache::CacheError::Decode { .. })
        ));
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache_at(1_000);
        cache.set("short", json!(1), Some(1)).unwrap();
        cache.set("long", json!(1), Some(100)).unwrap();
        cache.set("forever", json!(1), None).unwrap();
        clock.advance(2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 2);
    }
}
