//! In-process TTL store.
//!
//! Entries carry only their insertion instant; every caller picks its own
//! freshness window on read. One mutex guards the whole map.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::mutex_lock;

pub(super) const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "hiremebahamas_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "hiremebahamas_cache_miss_total";
pub(crate) const METRIC_CACHE_EXPIRED: &str = "hiremebahamas_cache_expired_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "hiremebahamas_cache_evict_total";
pub(crate) const METRIC_CACHE_INVALIDATED: &str = "hiremebahamas_cache_invalidated_total";

pub(super) struct Entry<V> {
    pub(super) value: V,
    pub(super) inserted_at: Instant,
}

#[derive(Default)]
pub(super) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    pub(super) invalidated: AtomicU64,
}

/// Point-in-time view of the store's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
    pub invalidated: u64,
}

/// Process-wide key/value store with lazy per-read expiry.
///
/// Values are handed out by `Clone`; store `Bytes` or `Arc<T>` to keep reads
/// cheap. When a cap is configured and reached, the oldest entries by
/// insertion time are dropped before the next write.
pub struct TtlCache<V> {
    pub(super) entries: Mutex<HashMap<String, Entry<V>>>,
    max_entries: Option<NonZeroUsize>,
    eviction_divisor: NonZeroUsize,
    pub(super) counters: Counters,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: config.max_entries_non_zero(),
            eviction_divisor: config.eviction_divisor_non_zero(),
            counters: Counters::default(),
        }
    }

    /// Return the value stored under `key` if it was written less than `ttl` ago.
    ///
    /// A stale entry is removed as a side effect.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let Some(entry) = entries.get(key) else {
            self.record_miss();
            return None;
        };

        if now.saturating_duration_since(entry.inserted_at) < ttl {
            let value = entry.value.clone();
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CACHE_HIT).increment(1);
            return Some(value);
        }

        entries.remove(key);
        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_EXPIRED).increment(1);
        self.record_miss();
        None
    }

    /// Store `value` under `key`, resetting its insertion time.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");

        if let Some(max) = self.max_entries
            && entries.len() >= max.get()
        {
            let count = (max.get() / self.eviction_divisor.get()).max(1);
            let evicted = evict_oldest(&mut entries, count);
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            counter!(METRIC_CACHE_EVICT).increment(evicted as u64);
            debug!(
                target = "hiremebahamas::cache",
                evicted,
                capacity = max.get(),
                "cache at capacity, evicted oldest entries"
            );
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "delete")
            .remove(key)
            .is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of stored entries, including stale ones not yet read.
    pub fn size(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "size").len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.size(),
            max_entries: self.max_entries.map(NonZeroUsize::get),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            invalidated: self.counters.invalidated.load(Ordering::Relaxed),
        }
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS).increment(1);
    }
}

/// Remove the `count` entries with the earliest insertion instants.
///
/// Sorts the full key set; callers hold the store lock throughout.
fn evict_oldest<V>(entries: &mut HashMap<String, Entry<V>>, count: usize) -> usize {
    let mut by_age: Vec<(String, Instant)> = entries
        .iter()
        .map(|(key, entry)| (key.clone(), entry.inserted_at))
        .collect();
    by_age.sort_by_key(|(_, inserted_at)| *inserted_at);

    let mut evicted = 0;
    for (key, _) in by_age.into_iter().take(count) {
        if entries.remove(&key).is_some() {
            evicted += 1;
        }
    }
    evicted
}
