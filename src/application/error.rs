use axum::response::Response;
use thiserror::Error;

use crate::infra::error::InfraError;

/// Diagnostics carried on a response for the logging middleware.
///
/// The public body never includes these messages.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Top-level failure of the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::*;

    #[test]
    fn attached_report_travels_with_the_response() {
        let mut response = StatusCode::BAD_GATEWAY.into_response();
        ErrorReport::from_message("tests", "upstream closed").attach(&mut response);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "tests");
        assert_eq!(report.messages, ["upstream closed"]);
    }

    #[test]
    fn infra_errors_convert_transparently() {
        let err: AppError = InfraError::configuration("database.url is required").into();
        assert_eq!(
            err.to_string(),
            "configuration error: database.url is required"
        );
    }
}
