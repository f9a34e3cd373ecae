/// Integration tests for the consistency engines
///
/// Run against the in-memory store; no external services are needed.
/// Run with: cargo test --test sync_tests

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Mutex;
use taskboard_shared::models::task::{CreateTask, Task, UpdateTask, UNASSIGNED_NAME};
use taskboard_shared::models::user::{CreateUser, UpdateUser, User};
use taskboard_shared::store::memory::MemoryStore;
use taskboard_shared::store::query::{Document, Filter, FindQuery};
use taskboard_shared::store::schema::Collection;
use taskboard_shared::store::update::Update;
use taskboard_shared::store::{DocumentStore, StoreError, StoreResult, UpdateOptions};
use taskboard_shared::sync::{task_sync, user_sync, SyncError, SyncStep};
use uuid::Uuid;

/// Helper to create a user with no pending tasks
async fn create_user(store: &dyn DocumentStore, name: &str) -> User {
    user_sync::create(
        store,
        &CreateUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            pending_tasks: vec![],
        },
    )
    .await
    .expect("Failed to create user")
    .record
}

/// Helper to create a task, optionally assigned
async fn create_task(store: &dyn DocumentStore, name: &str, assignee: Option<Uuid>) -> Task {
    let mut data = CreateTask::new(name, Utc::now() + Duration::days(7));
    data.assigned_user = assignee;
    let created = task_sync::create(store, &data)
        .await
        .expect("Failed to create task");
    assert!(created.report.is_clean());
    created.record
}

async fn load_user(store: &dyn DocumentStore, id: Uuid) -> User {
    User::find_by_id(store, id).await.unwrap().expect("user exists")
}

async fn load_task(store: &dyn DocumentStore, id: Uuid) -> Task {
    Task::find_by_id(store, id).await.unwrap().expect("task exists")
}

fn user_update(user: &User, pending_tasks: Vec<Uuid>) -> UpdateUser {
    UpdateUser {
        name: user.name.clone(),
        email: user.email.clone(),
        pending_tasks,
    }
}

fn task_update(task: &Task) -> UpdateTask {
    UpdateTask::new(task.name.clone(), task.deadline)
}

/// Checks that every pending list agrees with task assignments
async fn assert_consistent(store: &dyn DocumentStore) {
    let all = FindQuery::new(Filter::all());
    let tasks: Vec<Task> = store
        .find(&Task::COLLECTION, &all)
        .await
        .unwrap()
        .into_iter()
        .map(|doc| Task::from_document(doc).unwrap())
        .collect();
    let users: Vec<User> = store
        .find(&User::COLLECTION, &all)
        .await
        .unwrap()
        .into_iter()
        .map(|doc| User::from_document(doc).unwrap())
        .collect();

    for task in &tasks {
        let holders: Vec<&User> = users
            .iter()
            .filter(|u| u.pending_tasks.contains(&task.id))
            .collect();
        match task.assigned_user {
            Some(owner) if !task.completed => {
                assert_eq!(holders.len(), 1, "task {} should be pending once", task.id);
                assert_eq!(holders[0].id, owner);
            }
            _ => assert!(holders.is_empty(), "task {} should not be pending", task.id),
        }
        if task.assigned_user.is_none() {
            assert_eq!(task.assigned_user_name, UNASSIGNED_NAME);
        }
    }
}

#[tokio::test]
async fn test_create_task_adds_to_pending_tasks() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;

    let task = create_task(&store, "Write report", Some(ada.id)).await;

    assert_eq!(task.assigned_user_name, "Ada");
    assert_eq!(load_user(&store, ada.id).await.pending_tasks, vec![task.id]);
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_create_completed_task_is_not_pending() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;

    let mut data = CreateTask::new("Done already", Utc::now());
    data.assigned_user = Some(ada.id);
    data.completed = true;
    task_sync::create(&store, &data).await.unwrap();

    assert!(load_user(&store, ada.id).await.pending_tasks.is_empty());
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_create_task_with_unknown_assignee_fails() {
    let store = MemoryStore::new();

    let mut data = CreateTask::new("Orphan", Utc::now());
    data.assigned_user = Some(Uuid::new_v4());
    let result = task_sync::create(&store, &data).await;

    assert!(matches!(result, Err(SyncError::Validation(_))));
    assert_eq!(store.count(&Task::COLLECTION, &Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reassign_task_moves_between_users() {
    let store = MemoryStore::new();
    let u1 = create_user(&store, "Ada").await;
    let u2 = create_user(&store, "Grace").await;
    let task = create_task(&store, "Review", Some(u1.id)).await;

    let mut changes = task_update(&task);
    changes.assigned_user = Some(Some(u2.id));
    let updated = task_sync::update(&store, task.id, &changes).await.unwrap();

    assert!(updated.report.is_clean());
    assert_eq!(updated.record.assigned_user, Some(u2.id));
    assert_eq!(updated.record.assigned_user_name, "Grace");
    assert!(load_user(&store, u1.id).await.pending_tasks.is_empty());
    assert_eq!(load_user(&store, u2.id).await.pending_tasks, vec![task.id]);
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_completing_task_removes_it_from_pending_tasks() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let task = create_task(&store, "Ship", Some(ada.id)).await;

    let mut changes = task_update(&task);
    changes.completed = Some(true);
    task_sync::update(&store, task.id, &changes).await.unwrap();
    assert!(load_user(&store, ada.id).await.pending_tasks.is_empty());
    assert_consistent(&store).await;

    changes.completed = Some(false);
    task_sync::update(&store, task.id, &changes).await.unwrap();
    assert_eq!(load_user(&store, ada.id).await.pending_tasks, vec![task.id]);
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_clearing_assignment_unassigns_task() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let task = create_task(&store, "Ship", Some(ada.id)).await;

    let mut changes = task_update(&task);
    changes.assigned_user = Some(None);
    let updated = task_sync::update(&store, task.id, &changes).await.unwrap().record;

    assert_eq!(updated.assigned_user, None);
    assert_eq!(updated.assigned_user_name, UNASSIGNED_NAME);
    assert!(load_user(&store, ada.id).await.pending_tasks.is_empty());
}

#[tokio::test]
async fn test_update_task_validation_happens_before_writes() {
    let store = MemoryStore::new();
    let task = create_task(&store, "Ship", None).await;

    let mut changes = task_update(&task);
    changes.name = String::new();
    changes.completed = Some(true);
    assert!(matches!(
        task_sync::update(&store, task.id, &changes).await,
        Err(SyncError::Validation(_))
    ));

    let mut changes = task_update(&task);
    changes.assigned_user = Some(Some(Uuid::new_v4()));
    changes.completed = Some(true);
    assert!(matches!(
        task_sync::update(&store, task.id, &changes).await,
        Err(SyncError::Validation(_))
    ));

    assert!(!load_task(&store, task.id).await.completed);
}

#[tokio::test]
async fn test_update_missing_task_is_not_found() {
    let store = MemoryStore::new();
    let changes = UpdateTask::new("x", Utc::now());

    let result = task_sync::update(&store, Uuid::new_v4(), &changes).await;
    assert!(matches!(result, Err(SyncError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_task_removes_from_pending_tasks() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let keep = create_task(&store, "Keep", Some(ada.id)).await;
    let drop = create_task(&store, "Drop", Some(ada.id)).await;

    let deleted = task_sync::delete(&store, drop.id).await.unwrap();

    assert_eq!(deleted.record.id, drop.id);
    assert_eq!(load_user(&store, ada.id).await.pending_tasks, vec![keep.id]);
    assert!(Task::find_by_id(&store, drop.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_unassigned_task_has_no_side_effects() {
    let store = MemoryStore::new();
    let task = create_task(&store, "Loose", None).await;

    let deleted = task_sync::delete(&store, task.id).await.unwrap();
    assert!(deleted.report.applied.is_empty());

    assert!(matches!(
        task_sync::delete(&store, task.id).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_user_pending_tasks_reassigns_difference() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let t1 = create_task(&store, "T1", Some(ada.id)).await;
    let t2 = create_task(&store, "T2", Some(ada.id)).await;
    let t3 = create_task(&store, "T3", None).await;

    let result = user_sync::update(&store, ada.id, &user_update(&ada, vec![t2.id, t3.id]))
        .await
        .unwrap();

    assert!(result.report.is_clean());
    assert_eq!(result.record.pending_tasks, vec![t2.id, t3.id]);

    let t1 = load_task(&store, t1.id).await;
    assert_eq!(t1.assigned_user, None);
    assert_eq!(t1.assigned_user_name, UNASSIGNED_NAME);

    let t3 = load_task(&store, t3.id).await;
    assert_eq!(t3.assigned_user, Some(ada.id));
    assert_eq!(t3.assigned_user_name, "Ada");

    assert_eq!(load_task(&store, t2.id).await, t2);
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_update_user_with_missing_task_changes_nothing() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let t1 = create_task(&store, "T1", Some(ada.id)).await;

    let mut changes = user_update(&ada, vec![Uuid::new_v4()]);
    changes.name = "Renamed".to_string();
    let result = user_sync::update(&store, ada.id, &changes).await;

    assert!(matches!(result, Err(SyncError::NotFound(_))));
    let ada_after = load_user(&store, ada.id).await;
    assert_eq!(ada_after.name, "Ada");
    assert_eq!(ada_after.pending_tasks, vec![t1.id]);
    assert_eq!(load_task(&store, t1.id).await, t1);
}

#[tokio::test]
async fn test_update_user_with_completed_task_fails_validation() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let mut data = CreateTask::new("Done", Utc::now());
    data.completed = true;
    let done = task_sync::create(&store, &data).await.unwrap().record;

    let result = user_sync::update(&store, ada.id, &user_update(&ada, vec![done.id])).await;

    match result {
        Err(SyncError::Validation(message)) => {
            assert!(message.contains("cannot add a completed task"))
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(load_user(&store, ada.id).await.pending_tasks.is_empty());
    assert_eq!(load_task(&store, done.id).await.assigned_user, None);
}

#[tokio::test]
async fn test_update_user_takes_task_from_previous_owner() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let grace = create_user(&store, "Grace").await;
    let task = create_task(&store, "Shared", Some(ada.id)).await;

    user_sync::update(&store, grace.id, &user_update(&grace, vec![task.id]))
        .await
        .unwrap();

    assert!(load_user(&store, ada.id).await.pending_tasks.is_empty());
    assert_eq!(load_task(&store, task.id).await.assigned_user, Some(grace.id));
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_update_user_collapses_duplicate_ids() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let task = create_task(&store, "Once", None).await;

    let updated = user_sync::update(&store, ada.id, &user_update(&ada, vec![task.id, task.id]))
        .await
        .unwrap();

    assert_eq!(updated.record.pending_tasks, vec![task.id]);
}

#[tokio::test]
async fn test_update_user_duplicate_email_is_rejected() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let grace = create_user(&store, "Grace").await;
    let task = create_task(&store, "T", None).await;

    let mut changes = user_update(&grace, vec![task.id]);
    changes.email = ada.email.clone();
    let result = user_sync::update(&store, grace.id, &changes).await;

    assert!(matches!(result, Err(SyncError::Duplicate { field }) if field == "email"));
    assert_eq!(load_task(&store, task.id).await.assigned_user, None);
}

#[tokio::test]
async fn test_create_user_with_pending_tasks_assigns_them() {
    let store = MemoryStore::new();
    let t1 = create_task(&store, "T1", None).await;

    let user = user_sync::create(
        &store,
        &CreateUser {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            pending_tasks: vec![t1.id],
        },
    )
    .await
    .unwrap()
    .record;

    let t1 = load_task(&store, t1.id).await;
    assert_eq!(t1.assigned_user, Some(user.id));
    assert_eq!(t1.assigned_user_name, "Ada");
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_create_user_with_missing_task_creates_nothing() {
    let store = MemoryStore::new();

    let result = user_sync::create(
        &store,
        &CreateUser {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            pending_tasks: vec![Uuid::new_v4()],
        },
    )
    .await;

    assert!(matches!(result, Err(SyncError::NotFound(_))));
    assert_eq!(store.count(&User::COLLECTION, &Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_user_unassigns_tasks() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let grace = create_user(&store, "Grace").await;
    let t1 = create_task(&store, "T1", Some(ada.id)).await;
    let t2 = create_task(&store, "T2", Some(grace.id)).await;

    user_sync::delete(&store, ada.id).await.unwrap();

    let t1 = load_task(&store, t1.id).await;
    assert_eq!(t1.assigned_user, None);
    assert_eq!(t1.assigned_user_name, UNASSIGNED_NAME);
    assert_eq!(load_task(&store, t2.id).await.assigned_user, Some(grace.id));
    assert_consistent(&store).await;

    assert!(matches!(
        user_sync::delete(&store, ada.id).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_assign_then_delete_user_round_trip() {
    let store = MemoryStore::new();
    let ada = create_user(&store, "Ada").await;
    let task = create_task(&store, "Round trip", None).await;

    let mut changes = task_update(&task);
    changes.assigned_user = Some(Some(ada.id));
    task_sync::update(&store, task.id, &changes).await.unwrap();
    assert_eq!(load_user(&store, ada.id).await.pending_tasks, vec![task.id]);

    user_sync::delete(&store, ada.id).await.unwrap();

    let task = load_task(&store, task.id).await;
    assert_eq!(task.assigned_user, None);
    assert_eq!(task.assigned_user_name, UNASSIGNED_NAME);
}

/// Store wrapper whose writes to one collection can be switched off
struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Option<&'static str>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: Mutex::new(None),
        }
    }

    fn fail_writes_to(&self, collection: Option<&'static str>) {
        *self.failing.lock().unwrap() = collection;
    }

    fn check(&self, collection: &Collection) -> StoreResult<()> {
        if *self.failing.lock().unwrap() == Some(collection.name) {
            return Err(StoreError::Unavailable(format!(
                "{} is unavailable",
                collection.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn find(&self, collection: &Collection, query: &FindQuery) -> StoreResult<Vec<Document>> {
        self.inner.find(collection, query).await
    }

    async fn count(&self, collection: &Collection, filter: &Filter) -> StoreResult<u64> {
        self.inner.count(collection, filter).await
    }

    async fn find_by_id(&self, collection: &Collection, id: Uuid) -> StoreResult<Option<Document>> {
        self.inner.find_by_id(collection, id).await
    }

    async fn insert(&self, collection: &Collection, doc: Document) -> StoreResult<Document> {
        self.check(collection)?;
        self.inner.insert(collection, doc).await
    }

    async fn find_by_id_and_update(
        &self,
        collection: &Collection,
        id: Uuid,
        update: &Update,
        options: UpdateOptions,
    ) -> StoreResult<Option<Document>> {
        self.check(collection)?;
        self.inner
            .find_by_id_and_update(collection, id, update, options)
            .await
    }

    async fn find_by_id_and_delete(
        &self,
        collection: &Collection,
        id: Uuid,
    ) -> StoreResult<Option<Document>> {
        self.check(collection)?;
        self.inner.find_by_id_and_delete(collection, id).await
    }

    async fn update_many(
        &self,
        collection: &Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64> {
        self.check(collection)?;
        self.inner.update_many(collection, filter, update).await
    }
}

#[tokio::test]
async fn test_failed_sync_steps_are_reported_and_retryable() {
    let store = FlakyStore::new();
    let u1 = create_user(&store, "Ada").await;
    let u2 = create_user(&store, "Grace").await;
    let task = create_task(&store, "Review", Some(u1.id)).await;

    store.fail_writes_to(Some("users"));
    let mut changes = task_update(&task);
    changes.assigned_user = Some(Some(u2.id));
    let result = task_sync::update(&store, task.id, &changes).await.unwrap();

    // primary write committed, both pending list updates failed
    assert_eq!(result.record.assigned_user, Some(u2.id));
    assert_eq!(result.report.failed.len(), 2);
    assert_eq!(
        result.report.failed[0].step,
        SyncStep::PullPendingTask {
            user_id: u1.id,
            task_id: task.id
        }
    );
    assert!(result.report.failure_summary().is_some());
    assert_eq!(load_user(&store, u1.id).await.pending_tasks, vec![task.id]);

    store.fail_writes_to(None);
    let retry = result.report.retry_failed(&store).await;

    assert!(retry.is_clean());
    assert_eq!(retry.applied.len(), 2);
    assert_consistent(&store).await;
}

#[tokio::test]
async fn test_user_delete_sync_failure_is_reported() {
    let store = FlakyStore::new();
    let ada = create_user(&store, "Ada").await;
    let task = create_task(&store, "T", Some(ada.id)).await;

    store.fail_writes_to(Some("tasks"));
    let result = user_sync::delete(&store, ada.id).await.unwrap();

    assert_eq!(result.report.failed.len(), 1);
    assert_eq!(load_task(&store, task.id).await.assigned_user, Some(ada.id));

    store.fail_writes_to(None);
    assert!(result.report.retry_failed(&store).await.is_clean());
    assert_eq!(load_task(&store, task.id).await.assigned_user, None);
}
