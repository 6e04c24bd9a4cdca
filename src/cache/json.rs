//! Typed access to serialized payloads held in the store.
//!
//! A payload that no longer decodes is logged, dropped and reported as a
//! miss so the caller falls through to the source of truth.

use std::time::Duration;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use super::store::TtlCache;

/// Return the stored bytes under `key` once they decode as `T`.
pub fn get_json_bytes<T: DeserializeOwned>(
    cache: &TtlCache<Bytes>,
    key: &str,
    ttl: Duration,
) -> Option<Bytes> {
    let bytes = cache.get(key, ttl)?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(_) => Some(bytes),
        Err(err) => {
            warn!(
                target = "hiremebahamas::cache",
                key,
                error = %err,
                "discarding malformed cached payload"
            );
            cache.delete(key);
            None
        }
    }
}

/// Serialize `value` and store it under `key`, returning the stored bytes.
pub fn set_json<T: Serialize>(
    cache: &TtlCache<Bytes>,
    key: &str,
    value: &T,
) -> Result<Bytes, serde_json::Error> {
    let bytes = Bytes::from(serde_json::to_vec(value)?);
    cache.set(key, bytes.clone());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use crate::cache::CacheConfig;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Feed {
        posts: Vec<u32>,
    }

    #[test]
    fn stored_payload_decodes_back() {
        let cache = TtlCache::new(&CacheConfig::default());
        let feed = Feed {
            posts: vec![1, 2, 3],
        };

        set_json(&cache, "feed:global", &feed).expect("serializable");

        let bytes = get_json_bytes::<Feed>(&cache, "feed:global", Duration::from_secs(30))
            .expect("cached feed");
        let cached: Feed = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(cached, feed);
    }

    #[test]
    fn malformed_payload_is_a_miss_and_is_dropped() {
        let cache = TtlCache::new(&CacheConfig::default());
        cache.set("feed:global", Bytes::from_static(b"{not json"));

        let cached = get_json_bytes::<Feed>(&cache, "feed:global", Duration::from_secs(30));

        assert!(cached.is_none());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn raw_bytes_are_returned_verbatim_when_valid() {
        let cache = TtlCache::new(&CacheConfig::default());
        let stored = set_json(&cache, "feed:global", &Feed { posts: vec![7] }).expect("stored");

        let bytes = get_json_bytes::<Feed>(&cache, "feed:global", Duration::from_secs(30))
            .expect("cached bytes");
        assert_eq!(bytes, stored);
    }

    #[test]
    fn shape_mismatch_is_a_miss() {
        let cache = TtlCache::new(&CacheConfig::default());
        cache.set("feed:global", Bytes::from_static(br#"{"posts":"nope"}"#));

        let cached = get_json_bytes::<Feed>(&cache, "feed:global", Duration::from_secs(30));

        assert!(cached.is_none());
        assert_eq!(cache.size(), 0);
    }
}
