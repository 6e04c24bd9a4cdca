use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::listings::{JOBS_ORDER, POSTS_ORDER};
use crate::application::pagination::{PageRequest, PaginationError};
use crate::application::repos::{JobFilter, ListingRepo, PostFilter, RepoError};
use crate::domain::entities::{JobSummary, PostSummary};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const POST_COLUMNS: &str = "SELECT p.id, p.user_id, p.content, p.image_url, \
    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count, \
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count, \
    p.created_at FROM posts p WHERE 1=1";

const JOB_COLUMNS: &str = "SELECT j.id, j.title, j.company, j.location, j.job_type, \
    j.salary_range, j.created_at FROM jobs j WHERE j.is_active = TRUE";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    content: String,
    image_url: Option<String>,
    likes_count: i64,
    comments_count: i64,
    created_at: OffsetDateTime,
}

impl From<PostRow> for PostSummary {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            image_url: row.image_url,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    title: String,
    company: String,
    location: String,
    job_type: String,
    salary_range: Option<String>,
    created_at: OffsetDateTime,
}

impl From<JobRow> for JobSummary {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            company: row.company,
            location: row.location,
            job_type: row.job_type,
            salary_range: row.salary_range,
            created_at: row.created_at,
        }
    }
}

fn push_post_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &PostFilter) {
    if let Some(user_id) = filter.user_id {
        qb.push(" AND p.user_id = ");
        qb.push_bind(user_id);
    }
}

fn push_job_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &JobFilter) {
    if let Some(location) = filter.location.as_ref() {
        qb.push(" AND j.location ILIKE ");
        qb.push_bind(format!("%{}%", escape_like(location)));
        qb.push(r" ESCAPE '\'");
    }
    if let Some(job_type) = filter.job_type.as_ref() {
        qb.push(" AND j.job_type = ");
        qb.push_bind(job_type.clone());
    }
}

/// Escape `LIKE` metacharacters so user input only matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn posts_page_query(
    filter: &PostFilter,
    page: &PageRequest,
) -> Result<QueryBuilder<'static, Postgres>, PaginationError> {
    let mut qb = QueryBuilder::new(POST_COLUMNS);
    push_post_filter(&mut qb, filter);
    page.push_boundary(&mut qb, &POSTS_ORDER)?;
    POSTS_ORDER.push_order_by(&mut qb);
    page.push_limit(&mut qb);
    Ok(qb)
}

fn jobs_page_query(
    filter: &JobFilter,
    page: &PageRequest,
) -> Result<QueryBuilder<'static, Postgres>, PaginationError> {
    let mut qb = QueryBuilder::new(JOB_COLUMNS);
    push_job_filter(&mut qb, filter);
    page.push_boundary(&mut qb, &JOBS_ORDER)?;
    JOBS_ORDER.push_order_by(&mut qb);
    page.push_limit(&mut qb);
    Ok(qb)
}

#[async_trait]
impl ListingRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        filter: &PostFilter,
        page: &PageRequest,
    ) -> Result<Vec<PostSummary>, RepoError> {
        let mut qb = posts_page_query(filter, page)?;
        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostSummary::from).collect())
    }

    async fn count_posts(&self, filter: &PostFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1");
        push_post_filter(&mut qb, filter);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        page: &PageRequest,
    ) -> Result<Vec<JobSummary>, RepoError> {
        let mut qb = jobs_page_query(filter, page)?;
        let rows = qb
            .build_query_as::<JobRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(JobSummary::from).collect())
    }

    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM jobs j WHERE j.is_active = TRUE");
        push_job_filter(&mut qb, filter);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }
}
