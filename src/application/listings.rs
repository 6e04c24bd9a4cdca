//! Cached, paginated listings for the posts feed and the job board.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{KeysetOrder, PageRequest, Paginated};
use crate::application::repos::{JobFilter, ListingRepo, PostFilter, RepoError};
use crate::cache::{
    JOBS_LIST_PREFIX, JOBS_STATS_PREFIX, POSTS_LIST_PREFIX, TtlCache, hash_query,
    json::{get_json_bytes, set_json},
    jobs_list_key, posts_list_key,
};
use crate::domain::entities::{JobSummary, PostSummary};

/// Newest posts first; ids break ties between posts created in the same instant.
pub const POSTS_ORDER: KeysetOrder = KeysetOrder::newest_first("created_at", "id");
pub const JOBS_ORDER: KeysetOrder = KeysetOrder::newest_first("created_at", "id");

#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to serialize listing: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialized listing ready to be sent, with a content validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPayload {
    pub body: Bytes,
    pub etag: String,
    pub cache_hit: bool,
}

impl CachedPayload {
    fn new(body: Bytes, cache_hit: bool) -> Self {
        let etag = strong_etag(&body);
        Self {
            body,
            etag,
            cache_hit,
        }
    }
}

/// Strong validator: quoted hex SHA-256 of the body.
pub fn strong_etag(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

#[derive(Clone)]
pub struct ListingService {
    repo: Arc<dyn ListingRepo>,
    cache: Arc<TtlCache<Bytes>>,
    ttl: Duration,
}

impl ListingService {
    pub fn new(repo: Arc<dyn ListingRepo>, cache: Arc<TtlCache<Bytes>>, ttl: Duration) -> Self {
        Self { repo, cache, ttl }
    }

    pub fn cache(&self) -> &Arc<TtlCache<Bytes>> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn posts(
        &self,
        filter: &PostFilter,
        request: &PageRequest,
    ) -> Result<CachedPayload, ListingError> {
        let key = posts_list_key(hash_query(&request.cache_fragment()), filter.user_id);
        let fetch = async {
            let rows = self.repo.list_posts(filter, request).await?;
            let total = if request.is_offset() {
                Some(self.repo.count_posts(filter).await?)
            } else {
                None
            };
            Ok::<_, RepoError>(request.finish(rows, total, &POSTS_ORDER))
        };
        self.cached::<PostSummary, _>(&key, fetch).await
    }

    pub async fn jobs(
        &self,
        filter: &JobFilter,
        request: &PageRequest,
    ) -> Result<CachedPayload, ListingError> {
        let params = format!(
            "{};location={:?};job_type={:?}",
            request.cache_fragment(),
            filter.location,
            filter.job_type
        );
        let key = jobs_list_key(hash_query(&params));
        let fetch = async {
            let rows = self.repo.list_jobs(filter, request).await?;
            let total = if request.is_offset() {
                Some(self.repo.count_jobs(filter).await?)
            } else {
                None
            };
            Ok::<_, RepoError>(request.finish(rows, total, &JOBS_ORDER))
        };
        self.cached::<JobSummary, _>(&key, fetch).await
    }

    /// Drop every cached posts page. Called after a post is written.
    pub fn invalidate_posts(&self) -> usize {
        let removed = self.cache.invalidate_prefix(POSTS_LIST_PREFIX);
        debug!(target = "hiremebahamas::listings", removed, "posts listings invalidated");
        removed
    }

    /// Drop every cached job-board page and the aggregates derived from it.
    pub fn invalidate_jobs(&self) -> usize {
        let removed = self
            .cache
            .invalidate_prefixes(&[JOBS_LIST_PREFIX, JOBS_STATS_PREFIX]);
        debug!(target = "hiremebahamas::listings", removed, "job listings invalidated");
        removed
    }

    async fn cached<T, F>(&self, key: &str, fetch: F) -> Result<CachedPayload, ListingError>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<Paginated<T>, RepoError>>,
    {
        if let Some(body) = get_json_bytes::<Paginated<T>>(&self.cache, key, self.ttl) {
            debug!(target = "hiremebahamas::listings", key, "listing served from cache");
            return Ok(CachedPayload::new(body, true));
        }

        let page = fetch.await?;
        let body = set_json(&self.cache, key, &page)?;
        debug!(
            target = "hiremebahamas::listings",
            key,
            rows = page.data.len(),
            "listing loaded from repository"
        );
        Ok(CachedPayload::new(body, false))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::{Duration as TimeDuration, macros::datetime};

    use crate::application::pagination::{Cursor, PaginationMeta};
    use crate::cache::CacheConfig;

    use super::*;

    /// Listing repository over fixed rows, counting queries.
    #[derive(Default)]
    struct MemoryListings {
        posts: Vec<PostSummary>,
        jobs: Vec<JobSummary>,
        queries: AtomicUsize,
    }

    impl MemoryListings {
        fn seeded(posts: usize, jobs: usize) -> Self {
            let base = datetime!(2024-05-01 12:00 UTC);
            let posts = (1..=posts as i64)
                .map(|id| PostSummary {
                    id,
                    user_id: id % 3,
                    content: format!("post {id}"),
                    image_url: None,
                    likes_count: id * 2,
                    comments_count: id,
                    created_at: base + TimeDuration::minutes(id),
                })
                .collect();
            let jobs = (1..=jobs as i64)
                .map(|id| JobSummary {
                    id,
                    title: format!("job {id}"),
                    company: "Island Co".to_string(),
                    location: if id % 2 == 0 { "Nassau" } else { "Freeport" }.to_string(),
                    job_type: "full-time".to_string(),
                    salary_range: None,
                    created_at: base + TimeDuration::minutes(id),
                })
                .collect();
            Self {
                posts,
                jobs,
                queries: AtomicUsize::new(0),
            }
        }

        fn window<T: Clone>(
            rows: Vec<&T>,
            page: &PageRequest,
            position: impl Fn(&T) -> (time::OffsetDateTime, i64),
        ) -> Vec<T> {
            let mut rows = rows;
            rows.sort_by_key(|row| std::cmp::Reverse(position(*row)));
            let take = page.limit() as usize + 1;
            match page {
                PageRequest::Offset { skip, .. } => rows
                    .into_iter()
                    .skip(*skip as usize)
                    .take(take)
                    .cloned()
                    .collect(),
                PageRequest::Cursor { cursor, .. } => rows
                    .into_iter()
                    .filter(|row| match cursor {
                        Some(Cursor { id, ts: Some(ts) }) => position(*row) < (*ts, *id),
                        Some(Cursor { id, ts: None }) => position(*row).1 < *id,
                        None => true,
                    })
                    .take(take)
                    .cloned()
                    .collect(),
            }
        }

        fn matching_posts(&self, filter: &PostFilter) -> Vec<&PostSummary> {
            self.posts
                .iter()
                .filter(|post| filter.user_id.is_none_or(|user| post.user_id == user))
                .collect()
        }

        fn matching_jobs(&self, filter: &JobFilter) -> Vec<&JobSummary> {
            self.jobs
                .iter()
                .filter(|job| {
                    filter
                        .location
                        .as_deref()
                        .is_none_or(|location| job.location == location)
                        && filter
                            .job_type
                            .as_deref()
                            .is_none_or(|job_type| job.job_type == job_type)
                })
                .collect()
        }
    }

    #[async_trait]
    impl ListingRepo for MemoryListings {
        async fn list_posts(
            &self,
            filter: &PostFilter,
            page: &PageRequest,
        ) -> Result<Vec<PostSummary>, RepoError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Self::window(self.matching_posts(filter), page, |post| {
                (post.created_at, post.id)
            }))
        }

        async fn count_posts(&self, filter: &PostFilter) -> Result<u64, RepoError> {
            Ok(self.matching_posts(filter).len() as u64)
        }

        async fn list_jobs(
            &self,
            filter: &JobFilter,
            page: &PageRequest,
        ) -> Result<Vec<JobSummary>, RepoError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Self::window(self.matching_jobs(filter), page, |job| {
                (job.created_at, job.id)
            }))
        }

        async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, RepoError> {
            Ok(self.matching_jobs(filter).len() as u64)
        }
    }

    fn service(repo: Arc<MemoryListings>) -> ListingService {
        ListingService::new(
            repo,
            Arc::new(TtlCache::new(&CacheConfig::default())),
            Duration::from_secs(30),
        )
    }

    fn decode<T: DeserializeOwned>(payload: &CachedPayload) -> Paginated<T> {
        serde_json::from_slice(&payload.body).expect("listing json")
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_is_served_from_cache() {
        let repo = Arc::new(MemoryListings::seeded(5, 0));
        let listings = service(repo.clone());
        let request = PageRequest::first_page(2);

        let first = listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("first load");
        let second = listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("second load");

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.body, second.body);
        assert_eq!(first.etag, second.etag);
        assert_eq!(repo.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_listing_expires_after_ttl() {
        let repo = Arc::new(MemoryListings::seeded(3, 0));
        let listings = service(repo.clone());
        let request = PageRequest::first_page(10);

        listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("load");
        tokio::time::advance(Duration::from_secs(30)).await;
        let reload = listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("reload");

        assert!(!reload.cache_hit);
        assert_eq!(repo.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn offset_listing_reports_totals() {
        let listings = service(Arc::new(MemoryListings::seeded(5, 0)));

        let payload = listings
            .posts(
                &PostFilter::default(),
                &PageRequest::Offset { skip: 2, limit: 2 },
            )
            .await
            .expect("page");
        let page: Paginated<PostSummary> = decode(&payload);

        assert_eq!(
            page.data.iter().map(|post| post.id).collect::<Vec<_>>(),
            [3, 2]
        );
        assert_eq!(
            page.pagination,
            PaginationMeta {
                page: Some(2),
                limit: 2,
                total: Some(5),
                total_pages: Some(3),
                has_next: true,
                has_prev: true,
                skip: Some(2),
                next_cursor: None,
            }
        );
    }

    #[tokio::test]
    async fn cursor_listing_walks_all_rows() {
        let listings = service(Arc::new(MemoryListings::seeded(5, 0)));
        let mut cursor = None;
        let mut seen = Vec::new();

        loop {
            let request = PageRequest::Cursor { cursor, limit: 2 };
            let payload = listings
                .posts(&PostFilter::default(), &request)
                .await
                .expect("page");
            let page: Paginated<PostSummary> = decode(&payload);
            assert!(page.pagination.total.is_none());
            seen.extend(page.data.iter().map(|post| post.id));

            match page.pagination.next_cursor {
                Some(next) => cursor = Some(Cursor::decode(&next).expect("cursor")),
                None => break,
            }
        }

        assert_eq!(seen, [5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn user_scoped_posts_use_separate_keys() {
        let listings = service(Arc::new(MemoryListings::seeded(6, 0)));
        let request = PageRequest::first_page(10);

        let all = listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("all");
        let scoped = listings
            .posts(&PostFilter { user_id: Some(1) }, &request)
            .await
            .expect("scoped");

        assert!(!scoped.cache_hit);
        assert_ne!(all.etag, scoped.etag);
        let page: Paginated<PostSummary> = decode(&scoped);
        assert!(page.data.iter().all(|post| post.user_id == 1));
        assert_eq!(listings.cache().size(), 2);
    }

    #[tokio::test]
    async fn invalidation_targets_one_listing_group() {
        let listings = service(Arc::new(MemoryListings::seeded(3, 4)));
        let request = PageRequest::first_page(10);
        let nassau = JobFilter {
            location: Some("Nassau".to_string()),
            job_type: None,
        };

        listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("posts");
        listings
            .jobs(&JobFilter::default(), &request)
            .await
            .expect("jobs");
        listings.jobs(&nassau, &request).await.expect("jobs");
        listings.cache().set("jobs:stats:summary", Bytes::from_static(b"{}"));

        assert_eq!(listings.invalidate_jobs(), 3);
        assert_eq!(listings.cache().size(), 1);
        assert_eq!(listings.invalidate_posts(), 1);
        assert!(listings.cache().is_empty());
    }

    #[tokio::test]
    async fn corrupted_cache_entry_is_refetched() {
        let repo = Arc::new(MemoryListings::seeded(2, 0));
        let listings = service(repo.clone());
        let request = PageRequest::first_page(10);

        let first = listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("load");
        let key = posts_list_key(hash_query(&request.cache_fragment()), None);
        listings
            .cache()
            .set(key, Bytes::from_static(b"{\"data\":42}"));

        let reload = listings
            .posts(&PostFilter::default(), &request)
            .await
            .expect("reload");

        assert!(!reload.cache_hit);
        assert_eq!(reload.body, first.body);
        assert_eq!(repo.queries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn etag_is_quoted_sha256() {
        let etag = strong_etag(b"hello");
        assert_eq!(
            etag,
            "\"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824\""
        );
    }
}
