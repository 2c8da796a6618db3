//! Error types for backstop.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::router::{ExhaustionReport, RouteError};

/// Result type alias for backstop operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for backstop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    Exhausted(ExhaustionReport),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<RouteError> for Error {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Invalid(msg) => Error::Validation(msg),
            RouteError::Exhausted(report) => Error::Exhausted(report),
        }
    }
}

impl Error {
    /// Stable machine-readable code for the error envelope.
    fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Exhausted(_) => "all_providers_exhausted",
            Error::NotFound(_) => "not_found",
            Error::Internal(_) => "internal_error",
            Error::Database(_) => "database_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Exhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.kind(),
            "code": status.as_u16()
        });

        // The exhaustion report carries one entry per attempted provider so
        // callers can see the whole failure history, not just the last error.
        if let Error::Exhausted(report) = &self {
            let providers: Vec<serde_json::Value> = report
                .provider_failures()
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "provider": f.provider,
                        "attempts": f.attempts,
                        "error_kind": f.last_error.kind(),
                        "error": f.last_error.to_string(),
                    })
                })
                .collect();
            error["providers"] = serde_json::Value::Array(providers);
            error["total_attempts"] = serde_json::json!(report.total_attempts());
        }

        let body = serde_json::json!({ "error": error });

        (status, axum::Json(body)).into_response()
    }
}
