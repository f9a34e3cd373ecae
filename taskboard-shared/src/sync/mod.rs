/// Consistency engines
///
/// `Task.assignedUser` and `User.pendingTasks` describe the same relationship
/// from both ends. The engines keep them consistent:
///
/// - a task appears in its assignee's `pendingTasks` iff it is not completed
/// - a completed task appears in no `pendingTasks`
/// - `assignedUserName` is refreshed whenever the assignment changes
///
/// Each engine call validates, commits one primary write, then runs the
/// reconciliation on the other collection as independent [`saga::SyncStep`]s.
/// The store only guarantees single-document atomicity, so the reconciliation
/// is not atomic with the primary write; its outcome is returned in a
/// [`saga::SyncReport`] instead of being rolled back.
///
/// # Example
///
/// ```
/// use taskboard_shared::models::task::CreateTask;
/// use taskboard_shared::models::user::CreateUser;
/// use taskboard_shared::store::memory::MemoryStore;
/// use taskboard_shared::sync::{task_sync, user_sync};
///
/// # async fn example() -> Result<(), taskboard_shared::sync::SyncError> {
/// let store = MemoryStore::new();
/// let user = user_sync::create(&store, &CreateUser {
///     name: "Ada".to_string(),
///     email: "ada@example.com".to_string(),
///     pending_tasks: vec![],
/// }).await?.record;
///
/// let mut data = CreateTask::new("Write report", chrono::Utc::now());
/// data.assigned_user = Some(user.id);
/// let created = task_sync::create(&store, &data).await?;
/// assert!(created.report.is_clean());
/// # Ok(())
/// # }
/// ```

pub mod error;
pub mod saga;
pub mod task_sync;
pub mod user_sync;

pub use error::{SyncError, SyncResult};
pub use saga::{Reconciled, SyncReport, SyncStep};
