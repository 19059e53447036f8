//! Time source abstraction.
//!
//! Every TTL decision (locks, rate windows, CSRF expiry) reads time through
//! [`Clock`] so tests can drive expiry deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
pub trait Clock: Send + Sync {
    fn now_unix_sec(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Clock frozen at a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    timestamp: u64,
}

impl MockClock {
    pub fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }
}

impl Clock for MockClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp
    }
}

/// Clock that only moves when told to.
///
/// Shared between a component under test and the test body through an `Arc`,
/// so advancing it lets cached entries expire without sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    timestamp: AtomicU64,
}

impl ManualClock {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: AtomicU64::new(timestamp),
        }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.timestamp.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, timestamp: u64) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_sec(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_is_fixed() {
        let clock = MockClock::new(1_700_000_000);
        assert_eq!(clock.now_unix_sec(), 1_700_000_000);
        assert_eq!(clock.now_unix_sec(), 1_700_000_000);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        clock.advance(59);
        assert_eq!(clock.now_unix_sec(), 159);
        clock.set(10);
        assert_eq!(clock.now_unix_sec(), 10);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_unix_sec() > 1_577_836_800);
    }
}
