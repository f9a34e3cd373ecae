/// User endpoints
///
/// # Endpoints
///
/// - `GET    /api/users`     - List users (`where`, `sort`, `select`, `skip`, `limit`, `count`)
/// - `POST   /api/users`     - Create a user
/// - `GET    /api/users/:id` - Get a user (`select`)
/// - `PUT    /api/users/:id` - Replace a user
/// - `DELETE /api/users/:id` - Delete a user, unassigning its tasks

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    response::{with_sync_outcome, ApiResponse},
    routes::{
        input,
        query::{parse_projection, GetParams, ListParams, ListRequest},
    },
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use taskboard_shared::{
    models::user::{CreateUser, UpdateUser, User},
    sync::user_sync,
};
use uuid::Uuid;
use validator::Validate;

/// Create or replace request
///
/// A missing `pendingTasks` is the empty list.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[validate(
        required(message = "name is required"),
        length(min = 1, message = "name is required")
    )]
    pub name: Option<String>,

    #[validate(
        required(message = "email is required"),
        email(message = "Invalid email format")
    )]
    pub email: Option<String>,

    #[serde(default)]
    pub pending_tasks: Option<Vec<Uuid>>,
}

impl UserRequest {
    fn into_parts(self) -> ApiResult<(String, String, Vec<Uuid>)> {
        self.validate()?;
        match (self.name, self.email) {
            (Some(name), Some(email)) => Ok((name, email, self.pending_tasks.unwrap_or_default())),
            _ => Err(ApiError::BadRequest("name and email are required".to_string())),
        }
    }
}

/// List users
///
/// Unlike tasks, users are not limited unless `limit` is given.
pub async fn list_users(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<ApiResponse<Value>> {
    let Query(params) = params?;

    match params.into_request(None)? {
        ListRequest::Count(filter) => {
            let count = state.store.count(&User::COLLECTION, &filter).await?;
            Ok(ApiResponse::ok("OK", Value::from(count)))
        }
        ListRequest::Find(query) => {
            let docs = state.store.find(&User::COLLECTION, &query).await?;
            let docs = docs.into_iter().map(Value::Object).collect();
            Ok(ApiResponse::ok("OK", Value::Array(docs)))
        }
    }
}

/// Create a user
///
/// # Request
///
/// ```json
/// {
///   "name": "Ada",
///   "email": "ada@example.com",
///   "pendingTasks": ["7c0e0d9e-5a43-4d47-9d0c-2f5f8d1a9f10"]
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: malformed body, missing fields, completed task in `pendingTasks`
/// - `404 Not Found`: a task in `pendingTasks` does not exist
/// - `409 Conflict`: email already exists
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<User>> {
    let Json(req) = body?;
    let (name, email, pending_tasks) = req.into_parts()?;

    let created = user_sync::create(
        state.store.as_ref(),
        &CreateUser {
            name,
            email,
            pending_tasks,
        },
    )
    .await?;
    let message = with_sync_outcome("User created", &created.report);
    Ok(ApiResponse::created(message, created.record))
}

/// Get a user
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> ApiResult<ApiResponse<Value>> {
    let id = input::parse_id(&id, "user")?;
    let Query(params) = params?;
    let projection = parse_projection(params.select.as_deref())?;

    let doc = state
        .store
        .find_by_id(&User::COLLECTION, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let doc = match projection {
        Some(projection) => projection.apply(doc),
        None => doc,
    };

    Ok(ApiResponse::ok("OK", Value::Object(doc)))
}

/// Replace a user
///
/// Tasks removed from `pendingTasks` are unassigned; tasks added are
/// assigned to this user.
///
/// # Errors
///
/// - `400 Bad Request`: malformed id or body, missing fields, completed task in `pendingTasks`
/// - `404 Not Found`: no such user, or a task in `pendingTasks` does not exist
/// - `409 Conflict`: email already exists
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<User>> {
    let id = input::parse_id(&id, "user")?;
    let Json(req) = body?;
    let (name, email, pending_tasks) = req.into_parts()?;

    let updated = user_sync::update(
        state.store.as_ref(),
        id,
        &UpdateUser {
            name,
            email,
            pending_tasks,
        },
    )
    .await?;
    let message = with_sync_outcome("User updated", &updated.report);
    Ok(ApiResponse::ok(message, updated.record))
}

/// Delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<User>> {
    let id = input::parse_id(&id, "user")?;

    let deleted = user_sync::delete(state.store.as_ref(), id).await?;
    let message = with_sync_outcome("User deleted", &deleted.report);
    Ok(ApiResponse::ok(message, deleted.record))
}
