/// Task consistency engine
///
/// Keeps the assignee's `pendingTasks` in step with a task's `assignedUser`
/// and `completed` fields across create, update and delete. The assignee is
/// checked and `assignedUserName` derived before the task is written; the
/// `pendingTasks` changes run afterwards as [`SyncStep`]s.

use crate::models::task::{CreateTask, Task, UpdateTask, UNASSIGNED_NAME};
use crate::models::user::User;
use crate::store::DocumentStore;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::saga::{Reconciled, SyncReport, SyncStep};
use tracing::{info, instrument};
use uuid::Uuid;

fn task_not_found() -> SyncError {
    SyncError::NotFound("Task not found".to_string())
}

/// Resolves the cached display name for an assignee
///
/// # Errors
///
/// `SyncError::Validation` if the user does not exist.
async fn assignee_name(store: &dyn DocumentStore, user_id: Option<Uuid>) -> SyncResult<String> {
    let Some(user_id) = user_id else {
        return Ok(UNASSIGNED_NAME.to_string());
    };
    User::find_by_id(store, user_id)
        .await?
        .map(|user| user.name)
        .ok_or_else(|| SyncError::Validation(format!("assignedUser {} does not exist", user_id)))
}

fn require_name(name: &str) -> SyncResult<()> {
    if name.trim().is_empty() {
        return Err(SyncError::Validation("name is required".to_string()));
    }
    Ok(())
}

/// `pendingTasks` changes implied by a task moving from `before` to `after`
fn pending_steps(before: &Task, after: &Task) -> Vec<SyncStep> {
    let task_id = after.id;
    let mut steps = Vec::new();

    if before.assigned_user != after.assigned_user {
        if let Some(user_id) = before.assigned_user {
            steps.push(SyncStep::PullPendingTask { user_id, task_id });
        }
        if let Some(user_id) = after.assigned_user {
            if !after.completed {
                steps.push(SyncStep::AddPendingTask { user_id, task_id });
            }
        }
    } else if let Some(user_id) = after.assigned_user {
        if before.completed != after.completed {
            if after.completed {
                steps.push(SyncStep::PullPendingTask { user_id, task_id });
            } else {
                steps.push(SyncStep::AddPendingTask { user_id, task_id });
            }
        }
    }

    steps
}

/// Creates a task and lists it with its assignee
#[instrument(name = "taskboard.task_sync.create", skip(store, data), fields(task_name = %data.name))]
pub async fn create(store: &dyn DocumentStore, data: &CreateTask) -> SyncResult<Reconciled<Task>> {
    require_name(&data.name)?;
    let name = assignee_name(store, data.assigned_user).await?;

    let task = Task::create(store, data, &name).await?;
    info!(task_id = %task.id, "Task created");

    let mut steps = Vec::new();
    if let Some(user_id) = task.assigned_user {
        if !task.completed {
            steps.push(SyncStep::AddPendingTask {
                user_id,
                task_id: task.id,
            });
        }
    }

    let report = SyncReport::run(store, steps).await;
    Ok(Reconciled::new(task, report))
}

/// Updates a task and moves it between pending lists as needed
///
/// # Errors
///
/// - `SyncError::Validation` if `name` is empty or the new assignee does not exist
/// - `SyncError::NotFound` if the task does not exist
///
/// Neither case mutates anything. Failures of the `pendingTasks` updates
/// that follow the task write are returned in the report.
#[instrument(name = "taskboard.task_sync.update", skip(store, changes), fields(task_id = %id))]
pub async fn update(
    store: &dyn DocumentStore,
    id: Uuid,
    changes: &UpdateTask,
) -> SyncResult<Reconciled<Task>> {
    require_name(&changes.name)?;

    let before = Task::find_by_id(store, id).await?.ok_or_else(task_not_found)?;

    let assignment = match changes.assigned_user {
        Some(user_id) => Some((user_id, assignee_name(store, user_id).await?)),
        None => None,
    };
    let update = changes.to_update(
        assignment
            .as_ref()
            .map(|(user_id, name)| (*user_id, name.as_str())),
    );

    let after = Task::update(store, id, &update)
        .await?
        .ok_or_else(task_not_found)?;
    info!(
        old_user = ?before.assigned_user,
        new_user = ?after.assigned_user,
        completed = after.completed,
        "Task updated"
    );

    let report = SyncReport::run(store, pending_steps(&before, &after)).await;
    Ok(Reconciled::new(after, report))
}

/// Deletes a task and removes it from its assignee's pending list
#[instrument(name = "taskboard.task_sync.delete", skip(store), fields(task_id = %id))]
pub async fn delete(store: &dyn DocumentStore, id: Uuid) -> SyncResult<Reconciled<Task>> {
    let task = Task::delete(store, id).await?.ok_or_else(task_not_found)?;
    info!("Task deleted");

    let steps = task
        .assigned_user
        .map(|user_id| SyncStep::PullPendingTask {
            user_id,
            task_id: task.id,
        })
        .into_iter()
        .collect();

    let report = SyncReport::run(store, steps).await;
    Ok(Reconciled::new(task, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(assigned_user: Option<Uuid>, completed: bool) -> Task {
        Task {
            id: Uuid::nil(),
            name: "t".to_string(),
            description: String::new(),
            deadline: Utc::now(),
            completed,
            assigned_user,
            assigned_user_name: UNASSIGNED_NAME.to_string(),
            date_created: Utc::now(),
        }
    }

    #[test]
    fn test_reassignment_moves_task() {
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let steps = pending_steps(&task(Some(u1), false), &task(Some(u2), false));
        assert_eq!(
            steps,
            vec![
                SyncStep::PullPendingTask {
                    user_id: u1,
                    task_id: Uuid::nil()
                },
                SyncStep::AddPendingTask {
                    user_id: u2,
                    task_id: Uuid::nil()
                },
            ]
        );
    }

    #[test]
    fn test_reassigning_completed_task_only_pulls() {
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let steps = pending_steps(&task(Some(u1), false), &task(Some(u2), true));
        assert_eq!(
            steps,
            vec![SyncStep::PullPendingTask {
                user_id: u1,
                task_id: Uuid::nil()
            }]
        );
    }

    #[test]
    fn test_completion_toggle_with_same_user() {
        let u = Uuid::new_v4();
        let done = pending_steps(&task(Some(u), false), &task(Some(u), true));
        assert!(matches!(done[..], [SyncStep::PullPendingTask { .. }]));

        let reopened = pending_steps(&task(Some(u), true), &task(Some(u), false));
        assert!(matches!(reopened[..], [SyncStep::AddPendingTask { .. }]));
    }

    #[test]
    fn test_unassigned_task_needs_no_steps() {
        assert!(pending_steps(&task(None, false), &task(None, true)).is_empty());
    }
}
