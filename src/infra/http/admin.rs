use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::state::HttpState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct InvalidateQuery {
    prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    prefix: Option<String>,
    removed: usize,
}

pub(super) async fn cache_stats(State(state): State<HttpState>) -> Response {
    Json(state.listings.cache().stats()).into_response()
}

/// Drop cached entries under `prefix`, or everything when no prefix is given.
pub(super) async fn invalidate_cache(
    State(state): State<HttpState>,
    Query(query): Query<InvalidateQuery>,
) -> Response {
    let prefix = query.prefix.filter(|prefix| !prefix.is_empty());
    let removed = state
        .listings
        .cache()
        .invalidate_prefix(prefix.as_deref().unwrap_or(""));

    info!(
        target = "hiremebahamas::http::admin",
        prefix = prefix.as_deref().unwrap_or("*"),
        removed,
        "cache invalidated"
    );

    Json(InvalidateResponse { prefix, removed }).into_response()
}

pub(super) async fn rate_limit_stats(State(state): State<HttpState>) -> Response {
    Json(state.limiter.stats()).into_response()
}
