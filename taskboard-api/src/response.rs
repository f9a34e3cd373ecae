/// Response envelope
///
/// Every `/api` response body has the shape `{ "message": ..., "data": ... }`.
/// Successful handlers return [`ApiResponse`]; failures go through
/// [`ApiError`](crate::error::ApiError), which renders the same envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use taskboard_shared::sync::SyncReport;

/// `{message, data}` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message: String,
    pub data: T,
}

/// Successful response with a status code
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    body: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 OK
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    /// 201 Created
    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status,
            body: Envelope {
                message: message.into(),
                data,
            },
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Appends any reconciliation failures to a success message
///
/// The primary write already succeeded, so the status stays 2xx; the client
/// learns from the message that related records may be stale.
pub fn with_sync_outcome(message: &str, report: &SyncReport) -> String {
    match report.failure_summary() {
        Some(summary) => format!("{} ({})", message, summary),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_shared::sync::saga::FailedStep;
    use taskboard_shared::sync::SyncStep;
    use uuid::Uuid;

    #[test]
    fn test_clean_report_keeps_message() {
        assert_eq!(with_sync_outcome("OK", &SyncReport::default()), "OK");
    }

    #[test]
    fn test_failed_steps_are_appended() {
        let report = SyncReport {
            applied: vec![],
            failed: vec![FailedStep {
                step: SyncStep::UnassignAll {
                    user_id: Uuid::nil(),
                },
                error: "down".to_string(),
            }],
        };
        let message = with_sync_outcome("User deleted", &report);
        assert!(message.starts_with("User deleted (1 sync step(s) failed"));
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created("Created", 1).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
