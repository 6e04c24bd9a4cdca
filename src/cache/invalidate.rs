//! Group invalidation by key prefix.
//!
//! Keys are namespaced with colons, so a logical group such as "every cached
//! post listing page" shares one prefix. Invalidation scans the whole key set;
//! the store's entry cap bounds the cost.

use std::sync::atomic::Ordering;

use metrics::counter;
use tracing::debug;

use super::lock::mutex_lock;
use super::store::{METRIC_CACHE_INVALIDATED, SOURCE, TtlCache};

impl<V: Clone> TtlCache<V> {
    /// Remove every entry whose key starts with `prefix`, returning how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "invalidate_prefix");

        let matching: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        let mut removed = 0;
        for key in matching {
            if entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        drop(entries);

        self.counters
            .invalidated
            .fetch_add(removed as u64, Ordering::Relaxed);
        counter!(METRIC_CACHE_INVALIDATED).increment(removed as u64);
        debug!(
            target = "hiremebahamas::cache",
            prefix, removed, "invalidated cache prefix"
        );

        removed
    }

    /// Invalidate several groups at once, returning the total removed.
    pub fn invalidate_prefixes(&self, prefixes: &[&str]) -> usize {
        prefixes
            .iter()
            .map(|prefix| self.invalidate_prefix(prefix))
            .sum()
    }
}
