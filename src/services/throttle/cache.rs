//! Time-windowed throttle cache.
//!
//! Answers "was a notification for this fingerprint already sent within the
//! last `window`?" and marks the fingerprint in the same atomic step.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::instrument;

use super::clock::{Clock, SystemClock};
use super::fingerprint::FingerprintKey;
use crate::{Error, Result};

/// Default number of fingerprints tracked by the in-memory backend.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Backend-agnostic throttle contract.
///
/// Implementations must make `check_and_mark` a single atomic test-and-set:
/// among concurrent callers presenting the same key inside one window,
/// exactly one observes `false`.
pub trait ThrottleCache: Send + Sync {
    /// Tests and marks a fingerprint.
    ///
    /// Returns `Ok(true)` when the key is present and unexpired (the caller
    /// must suppress its notification). Otherwise records the key with
    /// `expires_at = now + window` and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheUnavailable`] if the backend cannot be reached.
    fn check_and_mark(&self, key: &FingerprintKey, window: Duration) -> Result<bool>;

    /// Short backend name used in logs and metrics.
    fn backend_name(&self) -> &'static str;
}

/// A marked fingerprint. Absent once `expires_at` has passed.
#[derive(Debug, Clone, Copy)]
struct ThrottleEntry {
    expires_at: Instant,
}

/// In-memory throttle cache.
///
/// # How it works
///
/// 1. An LRU map from fingerprint to expiry instant, guarded by one `Mutex`
/// 2. Lookup and insert happen under the same guard, which makes
///    `check_and_mark` atomic
/// 3. Expired entries are treated as absent and overwritten on the next check
/// 4. Capacity bounds memory; evicting a live entry can let one duplicate
///    notification through
///
/// # Lock Poisoning
///
/// A poisoned lock is reported as [`Error::CacheUnavailable`], which the
/// dispatcher handles by notifying anyway.
pub struct MemoryThrottleCache {
    entries: Mutex<LruCache<FingerprintKey, ThrottleEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryThrottleCache {
    /// Creates a cache with the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Creates a cache with an explicit time source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `capacity` is zero.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidInput("throttle cache capacity must be > 0".to_string())
        })?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(cap)),
            clock,
        })
    }

    /// Removes every expired entry and returns how many were dropped.
    ///
    /// Expiry is passive, so calling this is only needed to release memory early.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.lock()?;

        let expired: Vec<FingerprintKey> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }

        metrics::gauge!("throttle_cache_size", "backend" => "memory").set(entries.len() as f64);
        tracing::debug!(purged = expired.len(), remaining = entries.len(), "Purged expired throttle entries");

        Ok(expired.len())
    }

    /// Returns the number of tracked entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if no entries are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().map(|e| e.cap().get()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<FingerprintKey, ThrottleEntry>>> {
        self.entries.lock().map_err(|e| Error::CacheUnavailable {
            backend: "memory",
            cause: e.to_string(),
        })
    }
}

impl ThrottleCache for MemoryThrottleCache {
    #[instrument(skip(self), fields(operation = "throttle_check", key = %key))]
    fn check_and_mark(&self, key: &FingerprintKey, window: Duration) -> Result<bool> {
        let start = Instant::now();
        let now = self.clock.now();
        let expires_at = now.checked_add(window).ok_or_else(|| {
            Error::InvalidInput(format!("throttle window {window:?} overflows the clock"))
        })?;

        let throttled = {
            let mut entries = self.lock()?;
            let live = entries
                .get(key)
                .is_some_and(|entry| entry.expires_at > now);
            if !live {
                entries.put(key.clone(), ThrottleEntry { expires_at });
                metrics::gauge!("throttle_cache_size", "backend" => "memory")
                    .set(entries.len() as f64);
            }
            live
        };

        let result = if throttled { "throttled" } else { "marked" };
        metrics::counter!("throttle_checks_total", "backend" => "memory", "result" => result)
            .increment(1);
        metrics::histogram!("throttle_check_duration_ms", "backend" => "memory")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(result, "Throttle check complete");

        Ok(throttled)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::throttle::{Fingerprinter, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const WINDOW: Duration = Duration::from_secs(300);

    fn cache_with_clock(capacity: usize) -> (MemoryThrottleCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = MemoryThrottleCache::with_clock(capacity, Arc::clone(&clock) as Arc<dyn Clock>)
            .expect("create cache");
        (cache, clock)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            MemoryThrottleCache::new(0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_first_check_marks() {
        let (cache, _clock) = cache_with_clock(16);
        let key = Fingerprinter::fingerprint("http://x/app.js", 87);

        assert!(!cache.check_and_mark(&key, WINDOW).expect("check"));
        assert_eq!(cache.len(), 1);
        assert!(cache.check_and_mark(&key, WINDOW).expect("check"));
    }

    #[test]
    fn test_within_window_throttled() {
        let (cache, clock) = cache_with_clock(16);
        let key = Fingerprinter::fingerprint("http://x/app.js", 87);

        assert!(!cache.check_and_mark(&key, WINDOW).expect("check"));
        clock.advance(Duration::from_secs(1));
        assert!(cache.check_and_mark(&key, WINDOW).expect("check"));
        clock.advance(Duration::from_secs(298));
        assert!(cache.check_and_mark(&key, WINDOW).expect("check"));
    }

    #[test]
    fn test_expired_entry_remarked() {
        let (cache, clock) = cache_with_clock(16);
        let key = Fingerprinter::fingerprint("http://x/app.js", 87);

        assert!(!cache.check_and_mark(&key, WINDOW).expect("check"));
        clock.advance(WINDOW);
        assert!(!cache.check_and_mark(&key, WINDOW).expect("check"));
        // refreshed: suppressed again right after
        clock.advance(Duration::from_secs(1));
        assert!(cache.check_and_mark(&key, WINDOW).expect("check"));
    }

    #[test]
    fn test_throttled_check_does_not_extend_window() {
        let (cache, clock) = cache_with_clock(16);
        let key = Fingerprinter::fingerprint("http://x/app.js", 1);

        assert!(!cache.check_and_mark(&key, WINDOW).expect("check"));
        clock.advance(Duration::from_secs(200));
        assert!(cache.check_and_mark(&key, WINDOW).expect("check"));
        clock.advance(Duration::from_secs(100));
        assert!(!cache.check_and_mark(&key, WINDOW).expect("check"));
    }

    #[test]
    fn test_keys_independent() {
        let (cache, _clock) = cache_with_clock(16);
        let a = Fingerprinter::fingerprint("http://x/app.js", 1);
        let b = Fingerprinter::fingerprint("http://x/app.js", 2);

        assert!(!cache.check_and_mark(&a, WINDOW).expect("check"));
        assert!(!cache.check_and_mark(&b, WINDOW).expect("check"));
        assert!(cache.check_and_mark(&a, WINDOW).expect("check"));
    }

    #[test]
    fn test_lru_eviction_allows_duplicate() {
        let (cache, _clock) = cache_with_clock(2);
        let keys: Vec<_> = (1..=3)
            .map(|line| Fingerprinter::fingerprint("http://x/app.js", line))
            .collect();

        for key in &keys {
            assert!(!cache.check_and_mark(key, WINDOW).expect("check"));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);

        // least recently used key was evicted
        assert!(!cache.check_and_mark(&keys[0], WINDOW).expect("check"));
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache_with_clock(16);
        let short = Fingerprinter::fingerprint("http://x/a.js", 1);
        let long = Fingerprinter::fingerprint("http://x/b.js", 1);

        cache.check_and_mark(&short, Duration::from_secs(10)).expect("check");
        cache.check_and_mark(&long, WINDOW).expect("check");
        clock.advance(Duration::from_secs(11));

        assert_eq!(cache.purge_expired().expect("purge"), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.check_and_mark(&long, WINDOW).expect("check"));
    }

    #[test]
    fn test_window_overflow_rejected() {
        let (cache, _clock) = cache_with_clock(16);
        let key = Fingerprinter::fingerprint("http://x/app.js", 1);
        let result = cache.check_and_mark(&key, Duration::MAX);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_same_key_single_winner() {
        let cache = Arc::new(MemoryThrottleCache::new(128).expect("create cache"));
        let winners = Arc::new(AtomicUsize::new(0));
        let key = Fingerprinter::fingerprint("http://x/app.js", 87);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let winners = Arc::clone(&winners);
                let key = key.clone();
                thread::spawn(move || {
                    if !cache.check_and_mark(&key, WINDOW).expect("check") {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poisoned_lock_reports_unavailable() {
        let cache = Arc::new(MemoryThrottleCache::new(4).expect("create cache"));
        let poisoner = Arc::clone(&cache);
        let _ = thread::spawn(move || {
            let _guard = poisoner.entries.lock().expect("lock");
            std::panic::panic_any("poison the throttle lock");
        })
        .join();

        let key = Fingerprinter::fingerprint("http://x/app.js", 1);
        let err = cache.check_and_mark(&key, WINDOW).expect_err("poisoned");
        assert!(err.is_cache_unavailable());
    }
}
