use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::listings::ListingError;
use crate::application::pagination::PaginationError;
use crate::application::repos::RepoError;

const SOURCE: &str = "infra::http::error";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const TIMEOUT: &str = "request_timeout";
    pub const INVALID_CURSOR: &str = "invalid_cursor";
    pub const INVALID_QUERY: &str = "invalid_query";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// JSON error response. `detail` reaches the logs only.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "Internal server error",
            None,
        )
        .with_detail(detail)
    }

    pub fn request_timeout(deadline_secs: u64) -> Self {
        Self::new(
            StatusCode::REQUEST_TIMEOUT,
            codes::TIMEOUT,
            "Request timed out",
            Some(format!("Request exceeded the {deadline_secs}s deadline")),
        )
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let mut response = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMITED,
            "Rate limit exceeded",
            Some(format!("Retry after {retry_after} seconds")),
        )
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

impl From<PaginationError> for ApiError {
    fn from(err: PaginationError) -> Self {
        match err {
            PaginationError::InvalidCursor(_) | PaginationError::MissingSortKey(_) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_CURSOR,
                "Invalid cursor",
                Some(err.to_string()),
            ),
            PaginationError::InvalidQuery(_) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_QUERY,
                "Invalid pagination parameters",
                Some(err.to_string()),
            ),
        }
    }
}

impl From<ListingError> for ApiError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::Repo(RepoError::Pagination(err)) => err.into(),
            ListingError::Repo(RepoError::Timeout) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
                None,
            )
            .with_detail("database timeout"),
            ListingError::Repo(RepoError::Persistence(message)) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Listing could not be loaded",
                None,
            )
            .with_detail(message),
            ListingError::Serialize(err) => Self::internal(err.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_QUERY,
            "Invalid query parameters",
            Some(rejection.body_text()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report_message = format!(
            "{}: {}",
            self.code,
            self.detail
                .as_deref()
                .or(self.hint.as_deref())
                .unwrap_or(self.message)
        );
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(SOURCE, report_message).attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cursor_is_bad_request() {
        let err: ApiError = PaginationError::InvalidCursor("bad base64".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code, codes::INVALID_CURSOR);
    }

    #[test]
    fn repo_pagination_errors_surface_as_client_errors() {
        let err: ApiError = ListingError::Repo(RepoError::Pagination(
            PaginationError::MissingSortKey("created_at"),
        ))
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn persistence_details_stay_out_of_the_body() {
        let err: ApiError =
            ListingError::Repo(RepoError::Persistence("relation \"jobs\" does not exist".into()))
                .into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("does not exist"));
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(60);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("60"))
        );
    }
}
