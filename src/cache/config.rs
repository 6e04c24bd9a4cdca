//! Cache configuration.
//!
//! Controls the in-process TTL store and the listing cache windows via
//! `hiremebahamas.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_EVICTION_DIVISOR: usize = 10;
const DEFAULT_LISTING_TTL_SECS: u64 = 30;
const DEFAULT_STALE_WHILE_REVALIDATE_SECS: u64 = 60;

/// Cache configuration from `hiremebahamas.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held by the store. `None` disables the cap.
    pub max_entries: Option<usize>,
    /// When the cap is reached, `max_entries / eviction_divisor` of the oldest entries are dropped.
    pub eviction_divisor: usize,
    /// Freshness window applied to cached listing pages.
    pub listing_ttl_seconds: u64,
    /// Advertised `stale-while-revalidate` window on listing responses.
    pub stale_while_revalidate_seconds: u64,
    /// Preload the first page of each listing at startup.
    pub warm_on_startup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            eviction_divisor: DEFAULT_EVICTION_DIVISOR,
            listing_ttl_seconds: DEFAULT_LISTING_TTL_SECS,
            stale_while_revalidate_seconds: DEFAULT_STALE_WHILE_REVALIDATE_SECS,
            warm_on_startup: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries.map(NonZeroUsize::get),
            eviction_divisor: settings.eviction_divisor.get(),
            listing_ttl_seconds: settings.listing_ttl.as_secs(),
            stale_while_revalidate_seconds: settings.stale_while_revalidate.as_secs(),
            warm_on_startup: settings.warm_on_startup,
        }
    }
}

impl CacheConfig {
    /// Returns the entry cap, treating zero as "no cap".
    pub fn max_entries_non_zero(&self) -> Option<NonZeroUsize> {
        self.max_entries.and_then(NonZeroUsize::new)
    }

    /// Returns the eviction divisor, clamping to 1 if zero.
    pub fn eviction_divisor_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.eviction_divisor).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_seconds)
    }

    pub fn stale_while_revalidate(&self) -> Duration {
        Duration::from_secs(self.stale_while_revalidate_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, Some(1000));
        assert_eq!(config.eviction_divisor, 10);
        assert_eq!(config.listing_ttl(), Duration::from_secs(30));
        assert_eq!(config.stale_while_revalidate(), Duration::from_secs(60));
        assert!(config.warm_on_startup);
    }

    #[test]
    fn zero_cap_means_unbounded() {
        let config = CacheConfig {
            max_entries: Some(0),
            ..Default::default()
        };
        assert!(config.max_entries_non_zero().is_none());
    }

    #[test]
    fn non_zero_divisor_clamps_to_min() {
        let config = CacheConfig {
            eviction_divisor: 0,
            ..Default::default()
        };
        assert_eq!(config.eviction_divisor_non_zero().get(), 1);
    }
}
