//! Bounded LRU + TTL cache for reaction results.
//!
//! Every entry carries its own TTL. An entry is logically absent as soon as
//! its TTL has elapsed: [`TtlLruCache::get`] treats it as a miss and removes
//! it on the spot, while entries nobody asks for linger until the periodic
//! [`TtlLruCache::sweep_expired`] pass, which keeps the per-call cost flat.
//!
//! Capacity is enforced with strict LRU on access (not insertion order):
//! inserting into a full cache evicts exactly the least-recently-read key.
//!
//! The cache is shared between concurrently running tasks on a multi-thread
//! runtime, so all state sits behind a `parking_lot::Mutex`. No lock is held
//! across an `.await`.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ReactError, Result};
use crate::types::ReactionResult;

/// Cache of reaction results keyed by [`cache_key`](crate::key::cache_key).
pub type ReactionCache = TtlLruCache<ReactionResult>;

/// One cached value plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached payload.
    pub value: V,
    /// When the entry was written.
    pub created_at: Instant,
    /// How long the entry stays valid.
    pub ttl: Duration,
    /// Number of successful reads.
    pub access_count: u64,
    /// Time of the last successful read (or the write).
    pub last_accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed_at: now,
        }
    }

    /// Whether the entry's TTL has elapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// Statistics about the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Entries physically present.
    pub size: usize,
    /// Maximum entries.
    pub capacity: usize,
    /// `size / capacity` as a percentage.
    pub utilization_pct: f64,
    /// Present entries whose TTL has elapsed but were not swept yet.
    pub expired_entries: usize,
    /// Total LRU evictions.
    pub evictions: u64,
    /// Successful reads.
    pub hits: u64,
    /// Reads that found nothing (or only an expired entry).
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of reads that hit, in `[0, 1]`.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    evictions: u64,
    hits: u64,
    misses: u64,
}

/// Thread-safe bounded cache with per-entry TTL and LRU eviction.
pub struct TtlLruCache<V> {
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> TtlLruCache<V> {
    /// Create a cache holding at most `max_size` entries.
    ///
    /// # Errors
    /// Returns `ReactError::Config` if `max_size` is zero.
    pub fn new(max_size: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_size)
            .ok_or_else(|| ReactError::Config("cache max_size must be greater than zero".into()))?;
        Ok(Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                evictions: 0,
                hits: 0,
                misses: 0,
            }),
        })
    }

    /// Look up `key`, refreshing its recency on a hit.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.peek(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            inner.entries.pop(key);
            inner.misses += 1;
            debug!(key, "cache entry expired on read");
            return None;
        }

        let value = inner.entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.last_accessed_at = now;
            entry.value.clone()
        });
        inner.hits += 1;
        value
    }

    /// Insert or replace `key`, evicting the least-recently-used entry if full.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if let Some((evicted, _)) = inner.entries.push(key.clone(), CacheEntry::new(value, ttl, now)) {
            // `push` hands back the old entry when replacing the same key.
            if evicted != key {
                inner.evictions += 1;
                debug!(evicted = %evicted, "cache full, evicted least-recently-used entry");
            }
        }
    }

    /// Remove every key containing `pattern`. Returns how many were removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.inner.lock();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| key.contains(pattern))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            inner.entries.pop(key);
        }
        if !doomed.is_empty() {
            debug!(pattern, removed = doomed.len(), "invalidated cache entries");
        }
        doomed.len()
    }

    /// Remove all entries whose TTL has elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "swept expired cache entries");
        }
        expired.len()
    }

    /// Snapshot of size, capacity and counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        let size = inner.entries.len();
        let capacity = inner.entries.cap().get();
        CacheStats {
            size,
            capacity,
            utilization_pct: size as f64 / capacity as f64 * 100.0,
            expired_entries: inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .count(),
            evictions: inner.evictions,
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// TTL the entry under `key` was written with, without touching recency.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.inner.lock().entries.peek(key).map(|entry| entry.ttl)
    }

    /// Read count of the entry under `key`, without touching recency.
    #[must_use]
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.inner.lock().entries.peek(key).map(|entry| entry.access_count)
    }

    /// Entries physically present (expired ones included until swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(TtlLruCache::<u32>::new(0).is_err());
    }

    #[test]
    fn set_then_get_returns_value() {
        let cache = TtlLruCache::new(4).expect("cache");
        cache.set("a", 1, MINUTE);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_update_access_count() {
        let cache = TtlLruCache::new(4).expect("cache");
        cache.set("a", 1, MINUTE);
        cache.get("a");
        cache.get("a");
        assert_eq!(cache.access_count("a"), Some(2));
    }

    #[test]
    fn overwrite_replaces_without_eviction() {
        let cache = TtlLruCache::new(2).expect("cache");
        cache.set("a", 1, MINUTE);
        cache.set("b", 2, MINUTE);
        cache.set("a", 10, MINUTE);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.access_count("a"), Some(1));
    }

    #[test]
    fn eviction_follows_access_recency() {
        let cache = TtlLruCache::new(3).expect("cache");
        cache.set("a", 1, MINUTE);
        cache.set("b", 2, MINUTE);
        cache.set("c", 3, MINUTE);

        // Touch "a" so "b" becomes the least recently used.
        assert_eq!(cache.get("a"), Some(1));
        cache.set("d", 4, MINUTE);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn invalidate_pattern_removes_matching_keys() {
        let cache = TtlLruCache::new(10).expect("cache");
        cache.set("player_1:npc_merchant:aa", 1, MINUTE);
        cache.set("player_1:npc_guard:bb", 2, MINUTE);
        cache.set("player_2:npc_merchant:cc", 3, MINUTE);

        assert_eq!(cache.invalidate_pattern("npc_merchant"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("player_1:npc_guard:bb"), Some(2));
        assert_eq!(cache.invalidate_pattern("nothing"), 0);
    }

    #[test]
    fn stats_report_utilization() {
        let cache = TtlLruCache::new(4).expect("cache");
        cache.set("a", 1, MINUTE);
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 4);
        assert!((stats.utilization_pct - 25.0).abs() < 1e-9);
        assert_eq!(stats.expired_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlLruCache::new(4).expect("cache");
        cache.set("a", 1, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("a"), None);
        // Removed on read.
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let cache = TtlLruCache::new(4).expect("cache");
        cache.set("short", 1, Duration::from_secs(5));
        cache.set("long", 2, Duration::from_secs(500));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.ttl_of("long"), Some(Duration::from_secs(500)));
        assert_eq!(cache.ttl_of("short"), None);
    }
}
