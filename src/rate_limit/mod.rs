//! Request rate limiting.
//!
//! The primary backend is a shared fixed-window counter (Redis `INCR` +
//! `EXPIRE`). When it errors or times out, the call is served by an
//! in-process sliding window instead. Infrastructure failures never block a
//! request: the HTTP layer lets it through and logs the failure.

mod limiter;
mod local;
mod remote;

use std::time::Duration;

pub use limiter::{Backend, Decision, LimiterError, LimiterStats, RateLimiter};
pub use local::SlidingWindow;
pub use remote::{BackendError, CounterBackend, RedisCounter};

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RatePolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Whole seconds advertised in `Retry-After` and `X-RateLimit-Window`.
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}
