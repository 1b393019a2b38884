//! Memoized statistics results.
//!
//! Results are keyed by `(directory, band, window_size)` and kept until
//! evicted, invalidated or bypassed. Concurrent callers asking for the same
//! key wait on a per-key slot and share one computation. Failures are never
//! stored and never take up capacity.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::error::Result;
use crate::statistics::SummaryStatistics;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatisticsKey {
    /// Directory exactly as the caller passed it
    pub directory: PathBuf,
    pub band: usize,
    pub window_size: usize,
}

impl StatisticsKey {
    #[must_use]
    pub fn new(directory: impl AsRef<Path>, band: usize, window_size: usize) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            band,
            window_size,
        }
    }
}

type Slot = Arc<Mutex<Option<Arc<SummaryStatistics>>>>;

pub struct StatisticsCache {
    capacity: NonZeroUsize,
    slots: Mutex<LruCache<StatisticsKey, Slot>>,
}

impl StatisticsCache {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Capacity of at least one entry.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Return the cached result for `key`, computing and storing it first if
    /// absent. A caller arriving while another computes the same key blocks
    /// until that computation finishes.
    pub fn get_or_compute<F>(&self, key: &StatisticsKey, compute: F) -> Result<Arc<SummaryStatistics>>
    where
        F: FnOnce() -> Result<SummaryStatistics>,
    {
        let slot = self.slot(key);
        let mut guard = lock(&slot);

        if let Some(stats) = guard.as_ref() {
            debug!(directory = %key.directory.display(), band = key.band, window = key.window_size, "Statistics cache hit");
            return Ok(Arc::clone(stats));
        }

        let stats = match compute() {
            Ok(stats) => Arc::new(stats),
            Err(e) => {
                self.discard_empty(key, &slot);
                return Err(e);
            }
        };
        *guard = Some(Arc::clone(&stats));
        drop(guard);
        self.trim(key);
        Ok(stats)
    }

    /// Compute fresh, replacing whatever is cached for `key`.
    ///
    /// On failure the previous entry is left untouched.
    pub fn bypass<F>(&self, key: &StatisticsKey, compute: F) -> Result<Arc<SummaryStatistics>>
    where
        F: FnOnce() -> Result<SummaryStatistics>,
    {
        let slot = self.slot(key);
        let mut guard = lock(&slot);

        let stats = match compute() {
            Ok(stats) => Arc::new(stats),
            Err(e) => {
                if guard.is_none() {
                    self.discard_empty(key, &slot);
                }
                return Err(e);
            }
        };
        *guard = Some(Arc::clone(&stats));
        drop(guard);
        self.trim(key);
        debug!(directory = %key.directory.display(), band = key.band, window = key.window_size, "Statistics recomputed");
        Ok(stats)
    }

    /// Cached result for `key`, without computing. Blocks while the key is
    /// being computed.
    #[must_use]
    pub fn cached(&self, key: &StatisticsKey) -> Option<Arc<SummaryStatistics>> {
        let slot = lock(&self.slots).peek(key).cloned()?;
        lock(&slot).clone()
    }

    /// Drop the entry for `key`. Returns whether one was present.
    pub fn invalidate(&self, key: &StatisticsKey) -> bool {
        lock(&self.slots).pop(key).is_some()
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    /// Number of stored results. Keys still being computed are not counted.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .iter()
            .filter(|(_, slot)| slot.try_lock().is_ok_and(|stats| stats.is_some()))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &StatisticsKey) -> Slot {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.get_or_insert(key.clone(), || Arc::new(Mutex::new(None))))
    }

    /// Remove the still-empty slot a failed computation left behind. The
    /// caller holds the slot's lock, so no result can land in it meanwhile.
    fn discard_empty(&self, key: &StatisticsKey, slot: &Slot) {
        let mut slots = lock(&self.slots);
        if slots.peek(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.pop(key);
        }
    }

    /// Evict least recently used entries beyond capacity, keeping `key`.
    fn trim(&self, key: &StatisticsKey) {
        let mut slots = lock(&self.slots);
        slots.promote(key);
        while slots.len() > self.capacity.get() {
            if slots.pop_lru().is_none() {
                break;
            }
        }
    }
}

impl Default for StatisticsCache {
    fn default() -> Self {
        Self::with_capacity(crate::config::DEFAULT_STATS_CACHE_CAPACITY)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn stats(mean: f64) -> SummaryStatistics {
        SummaryStatistics {
            min: mean - 1.0,
            max: mean + 1.0,
            mean,
            count: 3,
            files: 1,
        }
    }

    #[test]
    fn test_second_call_is_served_from_cache() {
        let cache = StatisticsCache::with_capacity(4);
        let key = StatisticsKey::new("data", 1, 64);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(stats(5.0))
            })
            .unwrap();
        let second = cache
            .get_or_compute(&key, || -> Result<SummaryStatistics> { panic!("recomputed a cached key") })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_distinct() {
        let cache = StatisticsCache::with_capacity(4);
        cache.get_or_compute(&StatisticsKey::new("data", 1, 64), || Ok(stats(1.0))).unwrap();
        let other = cache
            .get_or_compute(&StatisticsKey::new("data", 1, 128), || Ok(stats(2.0)))
            .unwrap();
        assert_eq!(other.mean, 2.0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = StatisticsCache::with_capacity(4);
        let key = StatisticsKey::new("empty", 1, 64);

        let err = cache
            .get_or_compute(&key, || Err(QueryError::NoFilesFound { directory: "empty".into() }))
            .unwrap_err();
        assert!(matches!(err, QueryError::NoFilesFound { .. }));
        assert!(cache.cached(&key).is_none());
        assert_eq!(cache.len(), 0);

        let ok = cache.get_or_compute(&key, || Ok(stats(3.0))).unwrap();
        assert_eq!(ok.mean, 3.0);
    }

    #[test]
    fn test_bypass_replaces_entry() {
        let cache = StatisticsCache::with_capacity(4);
        let key = StatisticsKey::new("data", 1, 64);
        cache.get_or_compute(&key, || Ok(stats(1.0))).unwrap();

        let fresh = cache.bypass(&key, || Ok(stats(9.0))).unwrap();
        assert_eq!(fresh.mean, 9.0);
        assert_eq!(cache.cached(&key).unwrap().mean, 9.0);

        // A failed bypass keeps the previous result.
        assert!(cache.bypass(&key, || Err(QueryError::InvalidArgument("x".into()))).is_err());
        assert_eq!(cache.cached(&key).unwrap().mean, 9.0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = StatisticsCache::with_capacity(4);
        let a = StatisticsKey::new("a", 1, 64);
        let b = StatisticsKey::new("b", 1, 64);
        cache.get_or_compute(&a, || Ok(stats(1.0))).unwrap();
        cache.get_or_compute(&b, || Ok(stats(2.0))).unwrap();

        assert!(cache.invalidate(&a));
        assert!(!cache.invalidate(&a));
        assert!(cache.cached(&a).is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = StatisticsCache::with_capacity(1);
        let a = StatisticsKey::new("a", 1, 64);
        let b = StatisticsKey::new("b", 1, 64);
        cache.get_or_compute(&a, || Ok(stats(1.0))).unwrap();
        cache.get_or_compute(&b, || Ok(stats(2.0))).unwrap();
        assert!(cache.cached(&a).is_none());
        assert!(cache.cached(&b).is_some());
    }

    #[test]
    fn test_failing_keys_do_not_evict_results() {
        let cache = StatisticsCache::with_capacity(1);
        let good = StatisticsKey::new("data", 1, 64);
        cache.get_or_compute(&good, || Ok(stats(1.0))).unwrap();

        for dir in ["missing-a", "missing-b", "missing-c"] {
            let bad = StatisticsKey::new(dir, 1, 64);
            let err = cache
                .get_or_compute(&bad, || Err(QueryError::NoFilesFound { directory: dir.into() }))
                .unwrap_err();
            assert!(matches!(err, QueryError::NoFilesFound { .. }));
            assert!(cache.bypass(&bad, || Err(QueryError::InvalidArgument("x".into()))).is_err());
        }

        assert_eq!(cache.cached(&good).unwrap().mean, 1.0);
        assert_eq!(lock(&cache.slots).len(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(StatisticsCache::with_capacity(4));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = StatisticsKey::new("shared", 1, 256);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let key = key.clone();
                thread::spawn(move || {
                    cache
                        .get_or_compute(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(stats(4.0))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }
}
