use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::application::listings::CachedPayload;

const X_CACHE: &str = "x-cache";

/// Freshness advertised to clients and intermediaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: Duration,
    pub stale_while_revalidate: Duration,
}

impl CachePolicy {
    fn header_value(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.max_age.as_secs(),
            self.stale_while_revalidate.as_secs()
        )
    }
}

/// Serve a JSON payload, or 304 when the client already holds it.
pub(super) fn json_response(
    request_headers: &HeaderMap,
    payload: CachedPayload,
    policy: CachePolicy,
) -> Response {
    let not_modified = if_none_match_matches(request_headers, &payload.etag);

    let mut response = if not_modified {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        let mut response = Response::new(Body::from(payload.body));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    };

    let headers = response.headers_mut();
    if let Ok(etag) = HeaderValue::from_str(&payload.etag) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(cache_control) = HeaderValue::from_str(&policy.header_value()) {
        headers.insert(header::CACHE_CONTROL, cache_control);
    }
    headers.insert(
        X_CACHE,
        HeaderValue::from_static(if payload.cache_hit { "HIT" } else { "MISS" }),
    );
    response
}

/// Weak comparison: `W/` prefixes are ignored, `*` matches anything.
fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
        })
}
