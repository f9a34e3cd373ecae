/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check endpoint
/// - `tasks`: Task CRUD
/// - `users`: User CRUD
///
/// `query` and `input` hold the parameter and body parsing both resources share.

pub mod health;
pub mod input;
pub mod query;
pub mod tasks;
pub mod users;

use crate::error::ApiError;

/// Fallback for unknown paths
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
