/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`. Each variant maps to an HTTP
/// status and renders the `{message, data}` envelope, with `data` carrying
/// the error detail (or `null` for not-found).
///
/// # Example
///
/// ```
/// use taskboard_api::error::{ApiError, ApiResult};
/// use uuid::Uuid;
///
/// fn parse_id(raw: &str) -> ApiResult<Uuid> {
///     Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid ID format".to_string()))
/// }
///
/// assert!(parse_id("not-a-uuid").is_err());
/// ```

use crate::response::Envelope;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskboard_shared::store::{QueryError, StoreError};
use taskboard_shared::sync::SyncError;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400) - malformed JSON, ids or query parameters
    BadRequest(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email
    Conflict(String),

    /// Bad request (400) - field validation failures
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, data) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request".to_string(), Some(msg)),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict".to_string(), Some(msg)),
            ApiError::ValidationError(errors) => {
                let detail = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                (StatusCode::BAD_REQUEST, "Validation failed".to_string(), Some(detail))
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some("An internal error occurred".to_string()),
                )
            }
        };

        (status, Json(Envelope { message, data })).into_response()
    }
}

/// Convert store errors to API errors
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ApiError::ValidationError(vec![ValidationErrorDetail {
                field: "document".to_string(),
                message: msg,
            }]),
            StoreError::Duplicate { field } => ApiError::Conflict(format!("{} already exists", field)),
            StoreError::Query(e) => e.into(),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Convert query language errors to API errors
impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Convert consistency engine errors to API errors
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotFound(msg) => ApiError::NotFound(msg),
            SyncError::Validation(msg) => ApiError::BadRequest(msg),
            SyncError::Duplicate { field } => ApiError::Conflict(format!("{} already exists", field)),
            SyncError::Store(e) => e.into(),
        }
    }
}

/// Convert request validation errors to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(errors)
    }
}

/// Convert JSON body rejections to API errors
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Convert query string rejections to API errors
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::ValidationError(vec![]), StatusCode::BAD_REQUEST),
            (ApiError::InternalError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_sync_errors_map_to_statuses() {
        let err: ApiError = SyncError::Duplicate {
            field: "email".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(msg) if msg == "email already exists"));

        let err: ApiError = SyncError::Store(StoreError::Unavailable("down".to_string())).into();
        assert!(matches!(err, ApiError::InternalError(_)));

        let err: ApiError = SyncError::NotFound("Task not found".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_query_errors_are_bad_requests() {
        let err: ApiError = StoreError::Query(QueryError::UnsupportedOperator("$where".into())).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
