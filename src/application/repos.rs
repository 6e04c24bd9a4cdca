//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::{PageRequest, PaginationError};
use crate::domain::entities::{JobSummary, PostSummary};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostFilter {
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JobFilter {
    pub location: Option<String>,
    pub job_type: Option<String>,
}

/// Read side of the posts feed and job board.
///
/// `list_*` return up to `limit + 1` rows so the caller can detect a next page.
#[async_trait]
pub trait ListingRepo: Send + Sync {
    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: &PageRequest,
    ) -> Result<Vec<PostSummary>, RepoError>;

    async fn count_posts(&self, filter: &PostFilter) -> Result<u64, RepoError>;

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: &PageRequest,
    ) -> Result<Vec<JobSummary>, RepoError>;

    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, RepoError>;
}
