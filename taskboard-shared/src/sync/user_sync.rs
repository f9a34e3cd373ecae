/// User consistency engine
///
/// A user's `pendingTasks` is authoritative on the user side of the
/// relationship: tasks added to it are assigned to the user, tasks removed
/// from it are unassigned. Every added task must exist and be incomplete;
/// this is checked before the user is written. The task updates that follow
/// the user write are best effort and reported through [`SyncReport`].

use crate::models::task::Task;
use crate::models::user::{dedup_ids, CreateUser, UpdateUser, User};
use crate::store::DocumentStore;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::saga::{Reconciled, SyncReport, SyncStep};
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use uuid::Uuid;

fn user_not_found() -> SyncError {
    SyncError::NotFound("User not found".to_string())
}

fn require(field: &str, value: &str) -> SyncResult<()> {
    if value.trim().is_empty() {
        return Err(SyncError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Checks that every task about to be assigned exists and is incomplete
async fn check_assignable(store: &dyn DocumentStore, task_ids: &[Uuid]) -> SyncResult<()> {
    let tasks = Task::find_by_ids(store, task_ids).await?;

    if tasks.len() != task_ids.len() {
        debug!(
            requested = task_ids.len(),
            found = tasks.len(),
            "pendingTasks references missing tasks"
        );
        return Err(SyncError::NotFound(
            "One or more pendingTasks do not exist".to_string(),
        ));
    }

    if let Some(task) = tasks.iter().find(|task| task.completed) {
        return Err(SyncError::Validation(format!(
            "cannot add a completed task to pendingTasks: {}",
            task.id
        )));
    }

    Ok(())
}

/// Steps that hand `task_ids` over to `user`
fn assignment_steps(user: &User, task_ids: Vec<Uuid>) -> Vec<SyncStep> {
    if task_ids.is_empty() {
        return Vec::new();
    }
    vec![
        SyncStep::ReleaseTasks {
            keep_user: user.id,
            task_ids: task_ids.clone(),
        },
        SyncStep::AssignTasks {
            user_id: user.id,
            user_name: user.name.clone(),
            task_ids,
        },
    ]
}

/// Creates a user and assigns the tasks listed in `pending_tasks`
///
/// # Errors
///
/// - `SyncError::Validation` if name or email is empty, or a listed task is completed
/// - `SyncError::NotFound` if a listed task does not exist
/// - `SyncError::Duplicate` if the email is taken
#[instrument(name = "taskboard.user_sync.create", skip(store, data), fields(email = %data.email))]
pub async fn create(store: &dyn DocumentStore, data: &CreateUser) -> SyncResult<Reconciled<User>> {
    require("name", &data.name)?;
    require("email", &data.email)?;

    let task_ids = dedup_ids(&data.pending_tasks);
    check_assignable(store, &task_ids).await?;

    let user = User::create(store, data).await?;
    info!(user_id = %user.id, pending = task_ids.len(), "User created");

    let report = SyncReport::run(store, assignment_steps(&user, task_ids)).await;
    Ok(Reconciled::new(user, report))
}

/// Replaces a user's name, email and pending tasks
///
/// Tasks dropped from `pending_tasks` are unassigned if still assigned to
/// this user; tasks added are assigned to it and removed from any other
/// user's list. Tasks present before and after are not touched.
#[instrument(name = "taskboard.user_sync.update", skip(store, changes), fields(user_id = %id))]
pub async fn update(
    store: &dyn DocumentStore,
    id: Uuid,
    changes: &UpdateUser,
) -> SyncResult<Reconciled<User>> {
    require("name", &changes.name)?;
    require("email", &changes.email)?;

    let old = User::find_by_id(store, id).await?.ok_or_else(user_not_found)?;

    let new_ids = dedup_ids(&changes.pending_tasks);
    let old_set: HashSet<Uuid> = old.pending_tasks.iter().copied().collect();
    let new_set: HashSet<Uuid> = new_ids.iter().copied().collect();

    let to_unassign: Vec<Uuid> = old
        .pending_tasks
        .iter()
        .copied()
        .filter(|task_id| !new_set.contains(task_id))
        .collect();
    let to_assign: Vec<Uuid> = new_ids
        .iter()
        .copied()
        .filter(|task_id| !old_set.contains(task_id))
        .collect();

    check_assignable(store, &to_assign).await?;

    let user = User::update(store, id, &changes.to_update())
        .await?
        .ok_or_else(user_not_found)?;
    info!(
        unassign = to_unassign.len(),
        assign = to_assign.len(),
        "User updated"
    );

    let mut steps = Vec::new();
    if !to_unassign.is_empty() {
        steps.push(SyncStep::UnassignTasks {
            user_id: user.id,
            task_ids: to_unassign,
        });
    }
    steps.extend(assignment_steps(&user, to_assign));

    let report = SyncReport::run(store, steps).await;
    Ok(Reconciled::new(user, report))
}

/// Deletes a user and unassigns every task assigned to it
#[instrument(name = "taskboard.user_sync.delete", skip(store), fields(user_id = %id))]
pub async fn delete(store: &dyn DocumentStore, id: Uuid) -> SyncResult<Reconciled<User>> {
    let user = User::delete(store, id).await?.ok_or_else(user_not_found)?;
    info!("User deleted");

    let report = SyncReport::run(store, vec![SyncStep::UnassignAll { user_id: user.id }]).await;
    Ok(Reconciled::new(user, report))
}
