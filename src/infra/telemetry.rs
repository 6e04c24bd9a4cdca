use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const QUIET_DIRECTIVES: [&str; 2] = ["sqlx::query=warn", "redis=warn"];

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    // Per-statement sqlx logs drown out request logs at info.
    for directive in QUIET_DIRECTIVES {
        let directive = directive
            .parse()
            .map_err(|err| InfraError::telemetry(format!("invalid directive {directive}: {err}")))?;
        env_filter = env_filter.add_directive(directive);
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Runs once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "hiremebahamas_cache_hit_total",
            Unit::Count,
            "Cache reads that found a fresh entry."
        );
        describe_counter!(
            "hiremebahamas_cache_miss_total",
            Unit::Count,
            "Cache reads that found nothing usable, including expired entries."
        );
        describe_counter!(
            "hiremebahamas_cache_expired_total",
            Unit::Count,
            "Entries removed on read because they outlived the caller's TTL."
        );
        describe_counter!(
            "hiremebahamas_cache_evict_total",
            Unit::Count,
            "Entries evicted because the store reached capacity."
        );
        describe_counter!(
            "hiremebahamas_cache_invalidated_total",
            Unit::Count,
            "Entries removed by prefix invalidation."
        );
        describe_counter!(
            "hiremebahamas_rate_limit_checks_total",
            Unit::Count,
            "Rate-limit checks, labelled by the backend that served them."
        );
        describe_counter!(
            "hiremebahamas_rate_limit_denied_total",
            Unit::Count,
            "Requests rejected by the rate-limit policy."
        );
        describe_counter!(
            "hiremebahamas_rate_limit_remote_failure_total",
            Unit::Count,
            "Remote counter calls that errored or timed out."
        );
        describe_counter!(
            "hiremebahamas_rate_limit_fail_open_total",
            Unit::Count,
            "Requests let through because no rate-limit backend could answer."
        );
        describe_counter!(
            "hiremebahamas_http_timeout_total",
            Unit::Count,
            "Requests cut off by the per-request deadline."
        );
        describe_histogram!(
            "hiremebahamas_cache_warm_ms",
            Unit::Milliseconds,
            "Startup cache warm-up latency in milliseconds."
        );
    });
}
