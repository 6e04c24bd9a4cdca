//! Cache key definitions.
//!
//! Keys are colon-namespaced strings so that a logical group can be dropped
//! with one prefix invalidation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Every cached posts-feed page.
pub const POSTS_LIST_PREFIX: &str = "posts:list:";
/// Every cached job-board page.
pub const JOBS_LIST_PREFIX: &str = "jobs:list:";
/// Aggregates derived from the job board.
pub const JOBS_STATS_PREFIX: &str = "jobs:stats:";

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash a canonical parameter string for listing keys.
pub fn hash_query(query: &str) -> u64 {
    hash_value(&query)
}

/// `posts:list:<params>:<user_id|all>`
pub fn posts_list_key(params_hash: u64, user_id: Option<i64>) -> String {
    match user_id {
        Some(user_id) => format!("{POSTS_LIST_PREFIX}{params_hash:016x}:{user_id}"),
        None => format!("{POSTS_LIST_PREFIX}{params_hash:016x}:all"),
    }
}

/// `jobs:list:<params>`
pub fn jobs_list_key(params_hash: u64) -> String {
    format!("{JOBS_LIST_PREFIX}{params_hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posts_keys_share_group_prefix() {
        let scoped = posts_list_key(hash_query("limit=20"), Some(42));
        let global = posts_list_key(hash_query("limit=20"), None);

        assert!(scoped.starts_with(POSTS_LIST_PREFIX));
        assert!(scoped.ends_with(":42"));
        assert!(global.ends_with(":all"));
        assert_ne!(scoped, global);
    }

    #[test]
    fn jobs_keys_do_not_collide_with_stats() {
        let key = jobs_list_key(hash_query("limit=20"));
        assert!(key.starts_with(JOBS_LIST_PREFIX));
        assert!(!key.starts_with(JOBS_STATS_PREFIX));
    }

    #[test]
    fn different_queries_produce_different_hashes() {
        assert_eq!(hash_query("page=2"), hash_query("page=2"));
        assert_ne!(hash_query("page=1"), hash_query("page=2"));
    }
}
