use std::time::Instant;

use metrics::histogram;
use thiserror::Error;
use tracing::info;

use crate::application::{
    listings::{ListingError, ListingService},
    pagination::PageRequest,
    repos::{JobFilter, PostFilter},
};

const METRIC_CACHE_WARM_MS: &str = "hiremebahamas_cache_warm_ms";

#[derive(Debug, Error)]
pub enum CacheWarmError {
    #[error("failed to warm posts feed: {0}")]
    Posts(#[source] ListingError),
    #[error("failed to warm job board: {0}")]
    Jobs(#[source] ListingError),
}

/// Loads the first page of each listing so the first visitors hit the cache.
pub struct CacheWarmer {
    listings: ListingService,
    page_limit: u32,
}

impl CacheWarmer {
    pub fn new(listings: ListingService, page_limit: u32) -> Self {
        Self {
            listings,
            page_limit,
        }
    }

    /// Returns the number of pages written to the cache.
    pub async fn warm_initial(&self) -> Result<usize, CacheWarmError> {
        info!(target = "hiremebahamas::cache_warmer", "warming listing cache");
        let start = Instant::now();
        let request = PageRequest::first_page(self.page_limit);
        let mut warmed = 0;

        let posts = self
            .listings
            .posts(&PostFilter::default(), &request)
            .await
            .map_err(CacheWarmError::Posts)?;
        warmed += usize::from(!posts.cache_hit);

        let jobs = self
            .listings
            .jobs(&JobFilter::default(), &request)
            .await
            .map_err(CacheWarmError::Jobs)?;
        warmed += usize::from(!jobs.cache_hit);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_WARM_MS).record(elapsed_ms);
        info!(
            target = "hiremebahamas::cache_warmer",
            warmed,
            elapsed_ms,
            "listing cache warmed"
        );
        Ok(warmed)
    }
}
