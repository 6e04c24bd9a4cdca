//! HireMeBahamas cache layer
//!
//! A single in-process TTL store shared by handle across request handlers:
//!
//! - **Store**: string keys to `(value, inserted_at)`, expiry decided per read
//! - **Invalidation**: drop a logical group of keys by prefix after a write
//! - **JSON payloads**: typed access where a malformed payload is just a miss
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_entries = 1000
//! eviction_divisor = 10
//! listing_ttl_seconds = 30
//! ```

mod config;
mod invalidate;
pub mod json;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use keys::{
    JOBS_LIST_PREFIX, JOBS_STATS_PREFIX, POSTS_LIST_PREFIX, hash_query, hash_value,
    jobs_list_key, posts_list_key,
};
pub(crate) use lock::mutex_lock;
pub use store::{CacheStats, TtlCache};
