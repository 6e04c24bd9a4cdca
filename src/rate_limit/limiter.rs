use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::RatePolicy;
use super::local::SlidingWindow;
use super::remote::{BackendError, CounterBackend};

const METRIC_CHECKS: &str = "hiremebahamas_rate_limit_checks_total";
const METRIC_DENIED: &str = "hiremebahamas_rate_limit_denied_total";
const METRIC_REMOTE_FAILURE: &str = "hiremebahamas_rate_limit_remote_failure_total";
const METRIC_FAIL_OPEN: &str = "hiremebahamas_rate_limit_fail_open_total";

/// Which backend served a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Remote,
    Local,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Remote => "remote",
            Backend::Local => "local",
        }
    }
}

/// Outcome of a policy check. A denial is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub count: u64,
    pub backend: Backend,
}

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("remote counter failed and local fallback is disabled: {0}")]
    Backend(#[source] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub limit: u32,
    pub window_seconds: u64,
    pub remote_backend: Option<&'static str>,
    pub local_fallback: bool,
    pub remote_checks: u64,
    pub local_checks: u64,
    pub denied: u64,
    pub remote_failures: u64,
    pub fail_open: u64,
}

#[derive(Default)]
struct Counters {
    remote: AtomicU64,
    local: AtomicU64,
    denied: AtomicU64,
    remote_failures: AtomicU64,
    fail_open: AtomicU64,
}

enum Backends {
    Local(SlidingWindow),
    Remote {
        counter: Arc<dyn CounterBackend>,
        fallback: Option<SlidingWindow>,
    },
}

/// Per-identifier limiter composing a shared counter with a local fallback.
pub struct RateLimiter {
    policy: RatePolicy,
    backends: Backends,
    counters: Counters,
}

impl RateLimiter {
    /// Limiter served entirely by the in-process window.
    pub fn local(policy: RatePolicy) -> Self {
        Self {
            policy,
            backends: Backends::Local(SlidingWindow::new()),
            counters: Counters::default(),
        }
    }

    /// Limiter backed by a shared counter, optionally falling back to the local window.
    pub fn with_remote(
        policy: RatePolicy,
        remote: Arc<dyn CounterBackend>,
        local_fallback: bool,
    ) -> Self {
        Self {
            policy,
            backends: Backends::Remote {
                counter: remote,
                fallback: local_fallback.then(SlidingWindow::new),
            },
            counters: Counters::default(),
        }
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    /// Count this request against `identifier` and report whether it may proceed.
    ///
    /// A remote failure is retried on the local window within the same call,
    /// never on the remote side. An error means no backend could answer.
    pub async fn check_and_record(&self, identifier: &str) -> Result<Decision, LimiterError> {
        let (remote, fallback) = match &self.backends {
            Backends::Local(window) => return Ok(self.check_local(window, identifier)),
            Backends::Remote { counter, fallback } => (counter, fallback),
        };

        match remote.increment(identifier, self.policy.window).await {
            Ok(count) => {
                let decision = Decision {
                    allowed: count <= u64::from(self.policy.limit),
                    count,
                    backend: Backend::Remote,
                };
                Ok(self.record(decision))
            }
            Err(err) => {
                self.counters
                    .remote_failures
                    .fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_REMOTE_FAILURE).increment(1);
                warn!(
                    target = "hiremebahamas::rate_limit",
                    backend = remote.name(),
                    error = %err,
                    fallback = fallback.is_some(),
                    "remote rate-limit counter failed"
                );
                match fallback {
                    Some(window) => Ok(self.check_local(window, identifier)),
                    None => Err(LimiterError::Backend(err)),
                }
            }
        }
    }

    /// Note a request that was let through because the limiter could not answer.
    pub fn record_fail_open(&self) {
        self.counters.fail_open.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_FAIL_OPEN).increment(1);
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            limit: self.policy.limit,
            window_seconds: self.policy.window_secs(),
            remote_backend: match &self.backends {
                Backends::Local(_) => None,
                Backends::Remote { counter, .. } => Some(counter.name()),
            },
            local_fallback: match &self.backends {
                Backends::Local(_) => true,
                Backends::Remote { fallback, .. } => fallback.is_some(),
            },
            remote_checks: self.counters.remote.load(Ordering::Relaxed),
            local_checks: self.counters.local.load(Ordering::Relaxed),
            denied: self.counters.denied.load(Ordering::Relaxed),
            remote_failures: self.counters.remote_failures.load(Ordering::Relaxed),
            fail_open: self.counters.fail_open.load(Ordering::Relaxed),
        }
    }

    fn check_local(&self, window: &SlidingWindow, identifier: &str) -> Decision {
        let (allowed, count) = window.check_and_record(identifier, self.policy);
        self.record(Decision {
            allowed,
            count,
            backend: Backend::Local,
        })
    }

    fn record(&self, decision: Decision) -> Decision {
        let served = match decision.backend {
            Backend::Remote => &self.counters.remote,
            Backend::Local => &self.counters.local,
        };
        served.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CHECKS, "backend" => decision.backend.as_str()).increment(1);

        if !decision.allowed {
            self.counters.denied.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_DENIED).increment(1);
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;

    /// Fixed-window counter kept in memory, mirroring INCR + EXPIRE.
    #[derive(Default)]
    struct MemoryCounter {
        counters: Mutex<HashMap<String, (u64, Instant)>>,
    }

    #[async_trait]
    impl CounterBackend for MemoryCounter {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn increment(&self, key: &str, window: Duration) -> Result<u64, BackendError> {
            let now = Instant::now();
            let mut counters = self.counters.lock().expect("counter lock");
            let slot = counters.entry(key.to_string()).or_insert((0, now));
            if now.saturating_duration_since(slot.1) >= window {
                *slot = (0, now);
            }
            slot.0 += 1;
            Ok(slot.0)
        }
    }

    struct DownCounter;

    #[async_trait]
    impl CounterBackend for DownCounter {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn increment(&self, _key: &str, _window: Duration) -> Result<u64, BackendError> {
            Err(BackendError::Timeout(Duration::from_millis(50)))
        }
    }

    fn policy() -> RatePolicy {
        RatePolicy::new(3, Duration::from_secs(60))
    }

    async fn run(limiter: &RateLimiter, identifier: &str, times: usize) -> Vec<bool> {
        let mut outcomes = Vec::with_capacity(times);
        for _ in 0..times {
            let decision = limiter
                .check_and_record(identifier)
                .await
                .expect("limiter answers");
            outcomes.push(decision.allowed);
        }
        outcomes
    }

    #[tokio::test(start_paused = true)]
    async fn local_limit_then_reset_after_window() {
        let limiter = RateLimiter::local(policy());

        assert_eq!(run(&limiter, "ip:10.0.0.1", 4).await, [true, true, true, false]);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(run(&limiter, "ip:10.0.0.1", 1).await, [true]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_limit_then_reset_after_window() {
        let limiter = RateLimiter::with_remote(policy(), Arc::new(MemoryCounter::default()), true);

        assert_eq!(
            run(&limiter, "user@example.com", 4).await,
            [true, true, true, false]
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(run(&limiter, "user@example.com", 1).await, [true]);

        let stats = limiter.stats();
        assert_eq!(stats.remote_checks, 5);
        assert_eq!(stats.local_checks, 0);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.remote_backend, Some("memory"));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_falls_back_to_local_window() {
        let limiter = RateLimiter::with_remote(policy(), Arc::new(DownCounter), true);

        let decision = limiter
            .check_and_record("ip:10.0.0.2")
            .await
            .expect("local fallback answers");
        assert!(decision.allowed);
        assert_eq!(decision.backend, Backend::Local);

        assert_eq!(run(&limiter, "ip:10.0.0.2", 3).await, [true, true, false]);

        let stats = limiter.stats();
        assert_eq!(stats.remote_failures, 4);
        assert_eq!(stats.local_checks, 4);
        assert_eq!(stats.remote_checks, 0);
    }

    #[tokio::test]
    async fn remote_failure_without_fallback_is_an_error() {
        let limiter = RateLimiter::with_remote(policy(), Arc::new(DownCounter), false);

        let err = limiter
            .check_and_record("ip:10.0.0.3")
            .await
            .expect_err("no backend can answer");
        assert!(matches!(err, LimiterError::Backend(BackendError::Timeout(_))));
        assert!(!limiter.stats().local_fallback);
    }

    #[tokio::test]
    async fn fail_open_is_counted() {
        let limiter = RateLimiter::local(policy());
        limiter.record_fail_open();
        limiter.record_fail_open();
        assert_eq!(limiter.stats().fail_open, 2);
    }
}
