//! # Error Handling
//!
//! Storage-layer failures are expressed as [`StoreError`]; the HTTP surface maps
//! them onto a problem+json [`ApiError`] with trace ID propagation.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Seconds a client should wait before retrying after a provider outage.
const UNAVAILABLE_RETRY_AFTER_SECS: u64 = 5;

/// Failure taxonomy shared by adapters, repositories, the registry and the migration engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Input rejected before any external call was made.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Provider could not be reached or did not answer in time.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Unique constraint or equivalent rejection by the store.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Configuration has never passed a connection test.
    #[error("configuration {0} is not connected; run a connection test first")]
    NotConnected(String),
    /// Operation forbidden on the currently active configuration.
    #[error("configuration {0} is active")]
    ConfigurationActive(String),
    #[error("a migration is already in progress ({0})")]
    MigrationInProgress(String),
    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Short machine-readable kind, used in migration failure reports and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Conflict(_) => "conflict",
            StoreError::NotFound(_) => "not_found",
            StoreError::NotConnected(_) => "not_connected",
            StoreError::ConfigurationActive(_) => "configuration_active",
            StoreError::MigrationInProgress(_) => "migration_in_progress",
            StoreError::Storage(_) => "storage",
        }
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const MYSQL_DUPLICATE_CODES: &[&str] = &["1022", "1062", "1169", "1586"];
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code = code.as_ref();
        code == PG_UNIQUE
            || MYSQL_DUPLICATE_CODES.contains(&code)
            || SQLITE_DUPLICATE_CODES.contains(&code)
    })
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return StoreError::Conflict(error.to_string());
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => StoreError::NotFound(record),
            sea_orm::DbErr::Conn(err) => StoreError::Unavailable(err.to_string()),
            sea_orm::DbErr::ConnectionAcquire(err) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            StoreError::Unavailable(error.to_string())
        } else if error.is_decode() {
            StoreError::Storage(format!("invalid response body: {error}"))
        } else {
            StoreError::Storage(error.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Storage(format!("malformed record payload: {error}"))
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }

    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(String::into_boxed_str)
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let message = error.to_string();
        match error {
            StoreError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
            }
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", &message),
            StoreError::NotConnected(_) => {
                Self::new(StatusCode::CONFLICT, "NOT_CONNECTED", &message)
            }
            StoreError::ConfigurationActive(_) => {
                Self::new(StatusCode::CONFLICT, "CONFIGURATION_ACTIVE", &message)
            }
            StoreError::MigrationInProgress(_) => {
                Self::new(StatusCode::CONFLICT, "MIGRATION_IN_PROGRESS", &message)
            }
            StoreError::Conflict(_) => Self::new(StatusCode::CONFLICT, "CONFLICT", &message),
            StoreError::Unavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                &message,
            )
            .with_retry_after(UNAVAILABLE_RETRY_AFTER_SECS),
            StoreError::Storage(_) => {
                tracing::error!(error = %message, "Provider storage error");
                Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &message)
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err.body_text()),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err.body_text()),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::validation(&message)
    }
}
