//! HTTP surface: listing endpoints, admin endpoints and the shared middleware stack.

mod admin;
mod conditional;
pub mod error;
mod listings;
mod middleware;
mod state;

pub use conditional::CachePolicy;
pub use error::ApiError;
pub use middleware::{RequestContext, client_identifier};
pub use state::{HttpOptions, HttpState};

use axum::{
    Router, middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};

use self::middleware::{log_responses, rate_limit, request_timeout, set_request_context};

/// Build the public router serving the listing endpoints.
///
/// Layers, outermost first: request context, response logging, rate
/// limiting, request deadline. The limiter sits outside the deadline so
/// timed-out responses still carry the rate-limit headers.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/posts", get(listings::list_posts))
        .route("/api/jobs", get(listings::list_jobs))
        .fallback(not_found)
        .with_state(state.clone())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            request_timeout,
        ))
        .layer(axum_middleware::from_fn_with_state(state, rate_limit))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

/// Build the operator router for cache and limiter administration.
///
/// Served on its own listener; it is neither rate limited nor exposed on
/// the public address.
pub fn build_admin_router(state: HttpState) -> Router {
    Router::new()
        .route("/admin/cache/stats", get(admin::cache_stats))
        .route("/admin/cache", delete(admin::invalidate_cache))
        .route("/admin/rate-limit/stats", get(admin::rate_limit_stats))
        .fallback(not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn not_found() -> Response {
    ApiError::not_found("Route not found").into_response()
}
