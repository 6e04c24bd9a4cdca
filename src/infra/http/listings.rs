use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;

use crate::application::pagination::ListQuery;
use crate::application::repos::{JobFilter, PostFilter};

use super::conditional::json_response;
use super::error::ApiError;
use super::state::HttpState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PostsQuery {
    cursor: Option<String>,
    skip: Option<u64>,
    page: Option<u64>,
    limit: Option<u32>,
    user_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct JobsQuery {
    cursor: Option<String>,
    skip: Option<u64>,
    page: Option<u64>,
    limit: Option<u32>,
    location: Option<String>,
    job_type: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(super) async fn list_posts(
    State(state): State<HttpState>,
    headers: HeaderMap,
    query: Result<Query<PostsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let request = ListQuery {
        cursor: query.cursor,
        skip: query.skip,
        page: query.page,
        limit: query.limit,
    }
    .into_request(state.options.page_limits)?;
    let filter = PostFilter {
        user_id: query.user_id,
    };

    let payload = state.listings.posts(&filter, &request).await?;
    Ok(json_response(&headers, payload, state.options.cache_policy))
}

pub(super) async fn list_jobs(
    State(state): State<HttpState>,
    headers: HeaderMap,
    query: Result<Query<JobsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let request = ListQuery {
        cursor: query.cursor,
        skip: query.skip,
        page: query.page,
        limit: query.limit,
    }
    .into_request(state.options.page_limits)?;
    let filter = JobFilter {
        location: non_blank(query.location),
        job_type: non_blank(query.job_type),
    };

    let payload = state.listings.jobs(&filter, &request).await?;
    Ok(json_response(&headers, payload, state.options.cache_policy))
}
