use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{application::error::ErrorReport, rate_limit::RatePolicy};

use super::error::ApiError;
use super::state::HttpState;

const METRIC_HTTP_TIMEOUT: &str = "hiremebahamas_http_timeout_total";
const X_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATE_LIMIT_WINDOW: &str = "x-ratelimit-window";
const X_REQUEST_ID: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "hiremebahamas::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "hiremebahamas::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Cut the inner handler off after the configured deadline.
///
/// Work already done by the handler is not rolled back.
pub async fn request_timeout(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let deadline = state.options.request_timeout;
    let path = request.uri().path().to_string();

    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            counter!(METRIC_HTTP_TIMEOUT).increment(1);
            warn!(
                target = "hiremebahamas::http::timeout",
                path = %path,
                deadline_ms = deadline.as_millis() as u64,
                "request exceeded deadline"
            );
            ApiError::request_timeout(deadline.as_secs().max(1)).into_response()
        }
    }
}

/// Apply the request policy to every non-exempt path.
///
/// A denial answers 429. A limiter that cannot answer at all lets the
/// request through.
pub async fn rate_limit(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.options.is_rate_limit_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let policy = state.limiter.policy();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identifier = client_identifier(
        request.headers(),
        peer,
        state.options.trust_forwarded_headers,
    );

    match state.limiter.check_and_record(&identifier).await {
        Ok(decision) if !decision.allowed => {
            info!(
                target = "hiremebahamas::http::rate_limit",
                identifier = %identifier,
                path = %request.uri().path(),
                count = decision.count,
                limit = policy.limit,
                backend = decision.backend.as_str(),
                "rate limit exceeded"
            );
            let mut response = ApiError::rate_limited(policy.window_secs());
            apply_rate_limit_headers(response.headers_mut(), policy);
            return response;
        }
        Ok(_) => {}
        Err(err) => {
            state.limiter.record_fail_open();
            warn!(
                target = "hiremebahamas::http::rate_limit",
                identifier = %identifier,
                error = %err,
                "rate limiter unavailable, allowing request"
            );
        }
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), policy);
    response
}

/// Identify the caller by socket peer.
///
/// With `trust_forwarded` set (behind a proxy that overwrites them), the
/// first `X-Forwarded-For` hop, then `X-Real-IP`, take precedence. Clients
/// can set both headers freely, so they are ignored otherwise.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    let peer_identifier = || match peer {
        Some(addr) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    };
    if !trust_forwarded {
        return peer_identifier();
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    match forwarded.or_else(real_ip) {
        Some(ip) => format!("ip:{ip}"),
        None => peer_identifier(),
    }
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, policy: RatePolicy) {
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(policy.limit));
    headers.insert(X_RATE_LIMIT_WINDOW, HeaderValue::from(policy.window_secs()));
}
