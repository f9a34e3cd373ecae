/// Task model and store operations
///
/// A task may be assigned to one user. `assignedUserName` is a cached copy of
/// that user's name taken when the assignment last changed, or
/// [`UNASSIGNED_NAME`] when the task has no assignee. The consistency engine
/// in `sync::task_sync` is the only writer of the assignment fields.
///
/// # Document
///
/// ```json
/// {
///   "_id": "7c0e0d9e-5a43-4d47-9d0c-2f5f8d1a9f10",
///   "name": "Write report",
///   "description": "",
///   "deadline": "2025-03-01T17:00:00.000Z",
///   "completed": false,
///   "assignedUser": "0b6d3c1f-0d4f-4a34-8d2b-8b1c3f7e2a55",
///   "assignedUserName": "Ada",
///   "dateCreated": "2025-01-03T12:00:00.000Z"
/// }
/// ```
///
/// # Example
///
/// ```
/// use taskboard_shared::models::task::{CreateTask, Task, UNASSIGNED_NAME};
/// use taskboard_shared::store::memory::MemoryStore;
///
/// # async fn example() -> Result<(), taskboard_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// let task = Task::create(&store, &CreateTask::new("Write report", chrono::Utc::now()), UNASSIGNED_NAME).await?;
/// assert!(Task::find_by_id(&store, task.id).await?.is_some());
/// # Ok(())
/// # }
/// ```

use crate::store::query::{Document, Filter, FindQuery, ID_FIELD};
use crate::store::schema::{Collection, FieldDefault, FieldSpec, FieldType, Schema};
use crate::store::update::Update;
use crate::store::{DocumentStore, StoreResult, UpdateOptions};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Display name stored in `assignedUserName` when a task has no assignee
pub const UNASSIGNED_NAME: &str = "unassigned";

/// Field names as stored
pub mod fields {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const DEADLINE: &str = "deadline";
    pub const COMPLETED: &str = "completed";
    pub const ASSIGNED_USER: &str = "assignedUser";
    pub const ASSIGNED_USER_NAME: &str = "assignedUserName";
    pub const DATE_CREATED: &str = "dateCreated";
}

const TASK_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(fields::NAME, FieldType::String),
    FieldSpec::optional(fields::DESCRIPTION, FieldType::String, FieldDefault::Str("")),
    FieldSpec::required(fields::DEADLINE, FieldType::DateTime),
    FieldSpec::optional(fields::COMPLETED, FieldType::Boolean, FieldDefault::Bool(false)),
    FieldSpec::nullable(fields::ASSIGNED_USER, FieldType::Id),
    FieldSpec::optional(
        fields::ASSIGNED_USER_NAME,
        FieldType::String,
        FieldDefault::Str(UNASSIGNED_NAME),
    ),
    FieldSpec::optional(fields::DATE_CREATED, FieldType::DateTime, FieldDefault::Now),
];

/// Formats a timestamp the way documents store it (RFC 3339, millisecond precision, `Z`)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub deadline: DateTime<Utc>,

    #[serde(default)]
    pub completed: bool,

    /// Assigned user, `None` when unassigned
    #[serde(default)]
    pub assigned_user: Option<Uuid>,

    /// Cached name of the assigned user
    #[serde(default = "default_assigned_user_name")]
    pub assigned_user_name: String,

    pub date_created: DateTime<Utc>,
}

fn default_assigned_user_name() -> String {
    UNASSIGNED_NAME.to_string()
}

/// Input for creating a task
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTask {
    pub name: String,
    pub description: Option<String>,
    pub deadline: DateTime<Utc>,
    pub completed: bool,
    pub assigned_user: Option<Uuid>,
}

impl CreateTask {
    pub fn new(name: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description: None,
            deadline,
            completed: false,
            assigned_user: None,
        }
    }

    fn to_document(&self, assigned_user_name: &str) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::NAME.to_string(), json!(self.name));
        if let Some(description) = &self.description {
            doc.insert(fields::DESCRIPTION.to_string(), json!(description));
        }
        doc.insert(fields::DEADLINE.to_string(), json!(format_timestamp(self.deadline)));
        doc.insert(fields::COMPLETED.to_string(), json!(self.completed));
        doc.insert(fields::ASSIGNED_USER.to_string(), id_or_null(self.assigned_user));
        doc.insert(
            fields::ASSIGNED_USER_NAME.to_string(),
            json!(assigned_user_name),
        );
        doc
    }
}

/// Requested changes to a task
///
/// `name` and `deadline` are always written; the other fields are written
/// only when present. `assigned_user` distinguishes "leave as is" (`None`)
/// from "clear" (`Some(None)`).
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTask {
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub assigned_user: Option<Option<Uuid>>,
}

impl UpdateTask {
    pub fn new(name: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            deadline,
            description: None,
            completed: None,
            assigned_user: None,
        }
    }

    /// Store update for the requested fields; the assignment is written with
    /// the already derived display name
    pub fn to_update(&self, assignment: Option<(Option<Uuid>, &str)>) -> Update {
        let mut update = Update::new()
            .set(fields::NAME, self.name.clone())
            .set(fields::DEADLINE, format_timestamp(self.deadline));
        if let Some(description) = &self.description {
            update = update.set(fields::DESCRIPTION, description.clone());
        }
        if let Some(completed) = self.completed {
            update = update.set(fields::COMPLETED, completed);
        }
        if let Some((user, name)) = assignment {
            update = update
                .set(fields::ASSIGNED_USER, id_or_null(user))
                .set(fields::ASSIGNED_USER_NAME, name);
        }
        update
    }
}

/// JSON value of an optional id reference
pub fn id_or_null(id: Option<Uuid>) -> Value {
    id.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null)
}

/// JSON values of a list of ids, for `$in` filters and array operators
pub fn id_values(ids: &[Uuid]) -> Vec<Value> {
    ids.iter().map(|id| Value::String(id.to_string())).collect()
}

impl Task {
    /// The `tasks` collection
    pub const COLLECTION: Collection = Collection {
        name: "tasks",
        schema: Schema {
            fields: TASK_FIELDS,
            unique: &[],
        },
    };

    /// Decodes a stored document
    pub fn from_document(doc: Document) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    /// Filter matching tasks assigned to a user
    pub fn assigned_to(user_id: Uuid) -> Filter {
        Filter::all().eq(fields::ASSIGNED_USER, user_id.to_string())
    }

    /// Filter matching tasks by id
    pub fn with_ids(ids: &[Uuid]) -> Filter {
        Filter::all().is_in(ID_FIELD, id_values(ids))
    }

    /// Inserts a task with the given cached assignee name
    pub async fn create(
        store: &dyn DocumentStore,
        data: &CreateTask,
        assigned_user_name: &str,
    ) -> StoreResult<Self> {
        let doc = store
            .insert(&Self::COLLECTION, data.to_document(assigned_user_name))
            .await?;
        Self::from_document(doc)
    }

    pub async fn find_by_id(store: &dyn DocumentStore, id: Uuid) -> StoreResult<Option<Self>> {
        store
            .find_by_id(&Self::COLLECTION, id)
            .await?
            .map(Self::from_document)
            .transpose()
    }

    /// Loads every task whose id is in `ids`; missing ids are skipped
    pub async fn find_by_ids(store: &dyn DocumentStore, ids: &[Uuid]) -> StoreResult<Vec<Self>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        store
            .find(&Self::COLLECTION, &FindQuery::new(Self::with_ids(ids)))
            .await?
            .into_iter()
            .map(Self::from_document)
            .collect()
    }

    /// Applies an update with schema validation
    pub async fn update(
        store: &dyn DocumentStore,
        id: Uuid,
        update: &Update,
    ) -> StoreResult<Option<Self>> {
        store
            .find_by_id_and_update(&Self::COLLECTION, id, update, UpdateOptions::default())
            .await?
            .map(Self::from_document)
            .transpose()
    }

    pub async fn delete(store: &dyn DocumentStore, id: Uuid) -> StoreResult<Option<Self>> {
        store
            .find_by_id_and_delete(&Self::COLLECTION, id)
            .await?
            .map(Self::from_document)
            .transpose()
    }

    /// True when the task belongs in its assignee's pending list
    pub fn is_pending_for(&self, user_id: Uuid) -> bool {
        self.assigned_user == Some(user_id) && !self.completed
    }
}
