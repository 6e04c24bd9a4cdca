use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serial_test::serial;

use hiremebahamas::cache::{CacheConfig, TtlCache};
use hiremebahamas::infra::telemetry::describe_metrics;
use hiremebahamas::rate_limit::{BackendError, CounterBackend, RateLimiter, RatePolicy};

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debugging recorder should install");
        describe_metrics();
        snapshotter
    })
}

/// Counter totals by metric name, summed across labels.
fn counters() -> HashMap<String, u64> {
    let mut totals = HashMap::new();
    for (composite_key, _, _, value) in snapshotter().snapshot().into_vec() {
        if let DebugValue::Counter(count) = value {
            *totals
                .entry(composite_key.key().name().to_string())
                .or_insert(0) += count;
        }
    }
    totals
}

fn delta(before: &HashMap<String, u64>, after: &HashMap<String, u64>, name: &str) -> u64 {
    after.get(name).copied().unwrap_or(0) - before.get(name).copied().unwrap_or(0)
}

struct UnreachableCounter;

#[async_trait]
impl CounterBackend for UnreachableCounter {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn increment(&self, _key: &str, _window: Duration) -> Result<u64, BackendError> {
        Err(BackendError::Timeout(Duration::from_millis(10)))
    }
}

#[tokio::test(start_paused = true)]
#[serial]
async fn cache_operations_emit_metrics() {
    let before = counters();

    let cache = TtlCache::<String>::new(&CacheConfig {
        max_entries: Some(2),
        eviction_divisor: 2,
        ..CacheConfig::default()
    });
    let ttl = Duration::from_secs(30);

    cache.set("posts:list:a", "a".to_string());
    assert_eq!(cache.get("posts:list:a", ttl).as_deref(), Some("a"));
    assert!(cache.get("posts:list:missing", ttl).is_none());

    cache.set("posts:list:b", "b".to_string());
    cache.set("jobs:list:c", "c".to_string());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(cache.get("posts:list:b", ttl).is_none());

    cache.set("jobs:list:d", "d".to_string());
    let removed = cache.invalidate_prefix("jobs:");

    let after = counters();
    assert_eq!(delta(&before, &after, "hiremebahamas_cache_hit_total"), 1);
    assert_eq!(delta(&before, &after, "hiremebahamas_cache_miss_total"), 2);
    assert_eq!(delta(&before, &after, "hiremebahamas_cache_expired_total"), 1);
    assert_eq!(delta(&before, &after, "hiremebahamas_cache_evict_total"), 1);
    assert_eq!(
        delta(&before, &after, "hiremebahamas_cache_invalidated_total"),
        removed as u64
    );
}

#[tokio::test]
#[serial]
async fn limiter_decisions_emit_metrics() {
    let before = counters();

    let local = RateLimiter::local(RatePolicy::new(1, Duration::from_secs(60)));
    assert!(local.check_and_record("ip:10.1.1.1").await.expect("local answers").allowed);
    assert!(!local.check_and_record("ip:10.1.1.1").await.expect("local answers").allowed);

    let remote = RateLimiter::with_remote(
        RatePolicy::new(1, Duration::from_secs(60)),
        Arc::new(UnreachableCounter),
        false,
    );
    assert!(remote.check_and_record("ip:10.1.1.2").await.is_err());
    remote.record_fail_open();

    let after = counters();
    assert_eq!(delta(&before, &after, "hiremebahamas_rate_limit_checks_total"), 2);
    assert_eq!(delta(&before, &after, "hiremebahamas_rate_limit_denied_total"), 1);
    assert_eq!(
        delta(&before, &after, "hiremebahamas_rate_limit_remote_failure_total"),
        1
    );
    assert_eq!(delta(&before, &after, "hiremebahamas_rate_limit_fail_open_total"), 1);
}
