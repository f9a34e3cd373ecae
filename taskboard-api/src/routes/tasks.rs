/// Task endpoints
///
/// # Endpoints
///
/// - `GET    /api/tasks`     - List tasks (`where`, `sort`, `select`, `skip`, `limit`, `count`)
/// - `POST   /api/tasks`     - Create a task
/// - `GET    /api/tasks/:id` - Get a task (`select`)
/// - `PUT    /api/tasks/:id` - Replace a task's fields
/// - `DELETE /api/tasks/:id` - Delete a task
///
/// Writes go through `task_sync`, which keeps the assignee's `pendingTasks`
/// in step.

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
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use taskboard_shared::{
    models::task::{CreateTask, Task, UpdateTask},
    sync::task_sync,
};
use uuid::Uuid;
use validator::Validate;

/// Create or replace request
///
/// `assignedUserName` is derived from the assignee and ignored if sent.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    #[validate(
        required(message = "name is required"),
        length(min = 1, message = "name is required")
    )]
    pub name: Option<String>,

    pub description: Option<String>,

    #[serde(default, deserialize_with = "input::deadline")]
    #[validate(required(message = "deadline is required"))]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "input::flag")]
    pub completed: Option<bool>,

    #[serde(default, deserialize_with = "input::assignee")]
    pub assigned_user: Option<Option<Uuid>>,
}

impl TaskRequest {
    /// Validates and returns the required fields
    fn required(&self) -> ApiResult<(String, DateTime<Utc>)> {
        self.validate()?;
        match (&self.name, self.deadline) {
            (Some(name), Some(deadline)) => Ok((name.clone(), deadline)),
            _ => Err(ApiError::BadRequest("name and deadline are required".to_string())),
        }
    }

    fn into_create(self) -> ApiResult<CreateTask> {
        let (name, deadline) = self.required()?;
        Ok(CreateTask {
            name,
            description: self.description,
            deadline,
            completed: self.completed.unwrap_or(false),
            assigned_user: self.assigned_user.flatten(),
        })
    }

    fn into_update(self) -> ApiResult<UpdateTask> {
        let (name, deadline) = self.required()?;
        Ok(UpdateTask {
            name,
            deadline,
            description: self.description,
            completed: self.completed,
            assigned_user: self.assigned_user,
        })
    }
}

/// List tasks
///
/// Without `limit`, at most `TASKS_DEFAULT_LIMIT` tasks are returned.
///
/// # Errors
///
/// - `400 Bad Request`: malformed `where`, `sort`, `select`, `skip` or `limit`
pub async fn list_tasks(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<ApiResponse<Value>> {
    let Query(params) = params?;
    let request = params.into_request(Some(state.config.api.tasks_default_limit))?;

    match request {
        ListRequest::Count(filter) => {
            let count = state.store.count(&Task::COLLECTION, &filter).await?;
            Ok(ApiResponse::ok("OK", Value::from(count)))
        }
        ListRequest::Find(query) => {
            let docs = state.store.find(&Task::COLLECTION, &query).await?;
            let docs = docs.into_iter().map(Value::Object).collect();
            Ok(ApiResponse::ok("OK", Value::Array(docs)))
        }
    }
}

/// Create a task
///
/// # Request
///
/// ```json
/// {
///   "name": "Write report",
///   "deadline": "2025-03-01T17:00:00Z",
///   "assignedUser": "0b6d3c1f-0d4f-4a34-8d2b-8b1c3f7e2a55"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: malformed body, missing name or deadline, unknown assignee
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<Task>> {
    let Json(req) = body?;
    let data = req.into_create()?;

    let created = task_sync::create(state.store.as_ref(), &data).await?;
    let message = with_sync_outcome("Task created", &created.report);
    Ok(ApiResponse::created(message, created.record))
}

/// Get a task
///
/// # Errors
///
/// - `400 Bad Request`: malformed id or `select`
/// - `404 Not Found`: no such task
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> ApiResult<ApiResponse<Value>> {
    let id = input::parse_id(&id, "task")?;
    let Query(params) = params?;
    let projection = parse_projection(params.select.as_deref())?;

    let doc = state
        .store
        .find_by_id(&Task::COLLECTION, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    let doc = match projection {
        Some(projection) => projection.apply(doc),
        None => doc,
    };

    Ok(ApiResponse::ok("OK", Value::Object(doc)))
}

/// Replace a task's fields
///
/// `name` and `deadline` are required. Changing `assignedUser` or
/// `completed` moves the task between pending lists.
///
/// # Errors
///
/// - `400 Bad Request`: malformed id or body, missing fields, unknown assignee
/// - `404 Not Found`: no such task
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<Task>> {
    let id = input::parse_id(&id, "task")?;
    let Json(req) = body?;
    let changes = req.into_update()?;

    let updated = task_sync::update(state.store.as_ref(), id, &changes).await?;
    let message = with_sync_outcome("Task updated", &updated.report);
    Ok(ApiResponse::ok(message, updated.record))
}

/// Delete a task
///
/// # Errors
///
/// - `400 Bad Request`: malformed id
/// - `404 Not Found`: no such task
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Task>> {
    let id = input::parse_id(&id, "task")?;

    let deleted = task_sync::delete(state.store.as_ref(), id).await?;
    let message = with_sync_outcome("Task deleted", &deleted.report);
    Ok(ApiResponse::ok(message, deleted.record))
}
