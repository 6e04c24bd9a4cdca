use std::sync::Arc;
use std::time::Duration;

use crate::application::listings::ListingService;
use crate::application::pagination::PageLimits;
use crate::config::Settings;
use crate::rate_limit::RateLimiter;

use super::conditional::CachePolicy;

/// Request-facing knobs resolved from settings.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub page_limits: PageLimits,
    pub cache_policy: CachePolicy,
    pub request_timeout: Duration,
    pub rate_limit_exempt: Vec<String>,
    /// Identify clients by `X-Forwarded-For`/`X-Real-IP` rather than the socket peer.
    pub trust_forwarded_headers: bool,
}

impl HttpOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            page_limits: settings.pagination.limits(),
            cache_policy: CachePolicy {
                max_age: settings.cache.listing_ttl,
                stale_while_revalidate: settings.cache.stale_while_revalidate,
            },
            request_timeout: settings.http.request_timeout,
            rate_limit_exempt: settings.rate_limit.exempt_paths.clone(),
            trust_forwarded_headers: settings.rate_limit.trust_forwarded_headers,
        }
    }

    pub fn is_rate_limit_exempt(&self, path: &str) -> bool {
        self.rate_limit_exempt
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub listings: ListingService,
    pub limiter: Arc<RateLimiter>,
    pub options: Arc<HttpOptions>,
}

impl HttpState {
    pub fn new(listings: ListingService, limiter: Arc<RateLimiter>, options: HttpOptions) -> Self {
        Self {
            listings,
            limiter,
            options: Arc::new(options),
        }
    }
}
