use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::time::Instant;

use crate::cache::mutex_lock;

use super::RatePolicy;

const SOURCE: &str = "rate_limit::local";

/// In-process sliding window: exact request instants per identifier.
///
/// A single lock covers every identifier.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune instants older than the window, then admit the request if the
    /// remaining count is below the limit. Only admitted requests are recorded.
    ///
    /// Returns whether the request was admitted and the count it observed
    /// (including itself when admitted).
    pub fn check_and_record(&self, identifier: &str, policy: RatePolicy) -> (bool, u64) {
        let now = Instant::now();
        let mut buckets = mutex_lock(&self.buckets, SOURCE, "check_and_record");
        let bucket = buckets.entry(identifier.to_string()).or_default();

        while let Some(oldest) = bucket.front() {
            if now.saturating_duration_since(*oldest) >= policy.window {
                bucket.pop_front();
            } else {
                break;
            }
        }

        let current = bucket.len() as u64;
        if current >= u64::from(policy.limit) {
            return (false, current);
        }

        bucket.push_back(now);
        (true, current + 1)
    }

    /// Number of identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        mutex_lock(&self.buckets, SOURCE, "tracked").len()
    }
}
