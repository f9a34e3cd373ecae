/// Typed models over the document store
///
/// Each model owns its [`Collection`](crate::store::schema::Collection)
/// definition and wraps the untyped `DocumentStore` calls it needs.
///
/// # Models
///
/// - `task`: tasks with an optional assignee and a cached assignee name
/// - `user`: users with a unique email and a list of pending task ids
///
/// # Example
///
/// ```
/// use taskboard_shared::models::user::{CreateUser, User};
/// use taskboard_shared::store::memory::MemoryStore;
///
/// # async fn example() -> Result<(), taskboard_shared::store::StoreError> {
/// let store = MemoryStore::new();
///
/// let user = User::create(
///     &store,
///     &CreateUser {
///         name: "Ada".to_string(),
///         email: "ada@example.com".to_string(),
///         pending_tasks: Vec::new(),
///     },
/// )
/// .await?;
/// assert!(user.pending_tasks.is_empty());
/// # Ok(())
/// # }
/// ```

pub mod task;
pub mod user;
