/// Post-write reconciliation steps and their outcome
///
/// After an engine commits its primary write it describes the remaining work
/// on the other collection as a list of [`SyncStep`] values and runs them with
/// [`SyncReport::run`]. Each step is applied independently; a failure is
/// logged and recorded but does not stop the steps after it.
///
/// Steps are idempotent (pull, add-to-set, guarded set), so running a failed
/// step again converges to the same state. [`SyncReport::retry_failed`]
/// re-runs exactly the steps that failed.

use crate::models::task::{self, id_or_null, id_values, Task, UNASSIGNED_NAME};
use crate::models::user::{self, User};
use crate::store::query::{Filter, ID_FIELD};
use crate::store::update::Update;
use crate::store::{DocumentStore, StoreResult};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// One idempotent reconciliation action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// Remove a task id from a user's `pendingTasks`
    PullPendingTask { user_id: Uuid, task_id: Uuid },

    /// Add a task id to a user's `pendingTasks` if absent
    AddPendingTask { user_id: Uuid, task_id: Uuid },

    /// Remove task ids from the `pendingTasks` of every user except `keep_user`
    ReleaseTasks { keep_user: Uuid, task_ids: Vec<Uuid> },

    /// Clear the assignment of the listed tasks still assigned to `user_id`
    UnassignTasks { user_id: Uuid, task_ids: Vec<Uuid> },

    /// Assign the listed tasks to a user and cache the user's name
    AssignTasks {
        user_id: Uuid,
        user_name: String,
        task_ids: Vec<Uuid>,
    },

    /// Clear the assignment of every task assigned to `user_id`
    UnassignAll { user_id: Uuid },
}

fn clear_assignment() -> Update {
    Update::new()
        .set(task::fields::ASSIGNED_USER, id_or_null(None))
        .set(task::fields::ASSIGNED_USER_NAME, UNASSIGNED_NAME)
}

impl SyncStep {
    /// Applies the step, returning how many documents it matched
    pub async fn apply(&self, store: &dyn DocumentStore) -> StoreResult<u64> {
        match self {
            SyncStep::PullPendingTask { user_id, task_id } => {
                let update = Update::new().pull(user::fields::PENDING_TASKS, task_id.to_string());
                let matched = User::update(store, *user_id, &update).await?;
                Ok(u64::from(matched.is_some()))
            }
            SyncStep::AddPendingTask { user_id, task_id } => {
                let update =
                    Update::new().add_to_set(user::fields::PENDING_TASKS, task_id.to_string());
                let matched = User::update(store, *user_id, &update).await?;
                Ok(u64::from(matched.is_some()))
            }
            SyncStep::ReleaseTasks {
                keep_user,
                task_ids,
            } => {
                let filter = Filter::all()
                    .ne(ID_FIELD, keep_user.to_string())
                    .is_in(user::fields::PENDING_TASKS, id_values(task_ids));
                let update = Update::new().pull_all(user::fields::PENDING_TASKS, id_values(task_ids));
                store.update_many(&User::COLLECTION, &filter, &update).await
            }
            SyncStep::UnassignTasks { user_id, task_ids } => {
                let filter = Task::with_ids(task_ids)
                    .eq(task::fields::ASSIGNED_USER, user_id.to_string());
                store
                    .update_many(&Task::COLLECTION, &filter, &clear_assignment())
                    .await
            }
            SyncStep::AssignTasks {
                user_id,
                user_name,
                task_ids,
            } => {
                let update = Update::new()
                    .set(task::fields::ASSIGNED_USER, user_id.to_string())
                    .set(task::fields::ASSIGNED_USER_NAME, user_name.clone());
                store
                    .update_many(&Task::COLLECTION, &Task::with_ids(task_ids), &update)
                    .await
            }
            SyncStep::UnassignAll { user_id } => {
                store
                    .update_many(&Task::COLLECTION, &Task::assigned_to(*user_id), &clear_assignment())
                    .await
            }
        }
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStep::PullPendingTask { user_id, task_id } => {
                write!(f, "pull task {} from user {}", task_id, user_id)
            }
            SyncStep::AddPendingTask { user_id, task_id } => {
                write!(f, "add task {} to user {}", task_id, user_id)
            }
            SyncStep::ReleaseTasks {
                keep_user,
                task_ids,
            } => write!(
                f,
                "release tasks [{}] from users other than {}",
                join_ids(task_ids),
                keep_user
            ),
            SyncStep::UnassignTasks { user_id, task_ids } => {
                write!(f, "unassign tasks [{}] from user {}", join_ids(task_ids), user_id)
            }
            SyncStep::AssignTasks {
                user_id, task_ids, ..
            } => write!(f, "assign tasks [{}] to user {}", join_ids(task_ids), user_id),
            SyncStep::UnassignAll { user_id } => {
                write!(f, "unassign all tasks of user {}", user_id)
            }
        }
    }
}

/// A step that completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    pub step: SyncStep,
    pub matched: u64,
}

/// A step that failed, with the error rendered for logs and responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedStep {
    pub step: SyncStep,
    pub error: String,
}

/// Outcome of a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: Vec<AppliedStep>,
    pub failed: Vec<FailedStep>,
}

impl SyncReport {
    /// Runs every step in order, continuing past failures
    pub async fn run(store: &dyn DocumentStore, steps: Vec<SyncStep>) -> Self {
        let mut report = Self::default();

        for step in steps {
            match step.apply(store).await {
                Ok(matched) => {
                    debug!(step = %step, matched, "Sync step applied");
                    report.applied.push(AppliedStep { step, matched });
                }
                Err(e) => {
                    warn!(step = %step, error = %e, "Sync step failed");
                    report.failed.push(FailedStep {
                        step,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// True when no step failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Re-runs the failed steps and reports on that run only
    pub async fn retry_failed(&self, store: &dyn DocumentStore) -> Self {
        let steps = self.failed.iter().map(|f| f.step.clone()).collect();
        Self::run(store, steps).await
    }

    /// Human readable summary of the failures, if any
    pub fn failure_summary(&self) -> Option<String> {
        if self.is_clean() {
            return None;
        }
        let steps = self
            .failed
            .iter()
            .map(|f| f.step.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Some(format!(
            "{} sync step(s) failed: {}",
            self.failed.len(),
            steps
        ))
    }
}

/// A committed record together with the reconciliation that followed it
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub record: T,
    pub report: SyncReport,
}

impl<T> Reconciled<T> {
    pub fn new(record: T, report: SyncReport) -> Self {
        Self { record, report }
    }
}
