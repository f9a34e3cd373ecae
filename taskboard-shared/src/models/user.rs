/// User model and store operations
///
/// `pendingTasks` lists the ids of incomplete tasks assigned to the user, in
/// the order they were added, without duplicates. It is maintained by the
/// engines in `sync`, never by clients directly.
///
/// # Document
///
/// ```json
/// {
///   "_id": "0b6d3c1f-0d4f-4a34-8d2b-8b1c3f7e2a55",
///   "name": "Ada",
///   "email": "ada@example.com",
///   "pendingTasks": ["7c0e0d9e-5a43-4d47-9d0c-2f5f8d1a9f10"],
///   "dateCreated": "2025-01-03T12:00:00.000Z"
/// }
/// ```
///
/// Emails are unique across users; the store reports collisions as
/// `StoreError::Duplicate { field: "email" }`.

use crate::models::task::id_values;
use crate::store::query::Document;
use crate::store::schema::{Collection, FieldDefault, FieldSpec, FieldType, Schema};
use crate::store::update::Update;
use crate::store::{DocumentStore, StoreResult, UpdateOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Field names as stored
pub mod fields {
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const PENDING_TASKS: &str = "pendingTasks";
    pub const DATE_CREATED: &str = "dateCreated";
}

const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(fields::NAME, FieldType::String),
    FieldSpec::required(fields::EMAIL, FieldType::String),
    FieldSpec::optional(fields::PENDING_TASKS, FieldType::IdList, FieldDefault::EmptyList),
    FieldSpec::optional(fields::DATE_CREATED, FieldType::DateTime, FieldDefault::Now),
];

/// User record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,

    pub name: String,

    pub email: String,

    #[serde(default)]
    pub pending_tasks: Vec<Uuid>,

    pub date_created: DateTime<Utc>,
}

/// Input for creating a user
#[derive(Debug, Clone, PartialEq)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub pending_tasks: Vec<Uuid>,
}

/// Replacement state for a user
///
/// `pending_tasks` is the complete new list.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateUser {
    pub name: String,
    pub email: String,
    pub pending_tasks: Vec<Uuid>,
}

/// Removes duplicate ids, keeping the first occurrence
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl CreateUser {
    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::NAME.to_string(), json!(self.name));
        doc.insert(fields::EMAIL.to_string(), json!(self.email));
        doc.insert(
            fields::PENDING_TASKS.to_string(),
            Value::Array(id_values(&dedup_ids(&self.pending_tasks))),
        );
        doc
    }
}

impl UpdateUser {
    pub fn to_update(&self) -> Update {
        Update::new()
            .set(fields::NAME, self.name.clone())
            .set(fields::EMAIL, self.email.clone())
            .set(
                fields::PENDING_TASKS,
                Value::Array(id_values(&dedup_ids(&self.pending_tasks))),
            )
    }
}

impl User {
    /// The `users` collection
    pub const COLLECTION: Collection = Collection {
        name: "users",
        schema: Schema {
            fields: USER_FIELDS,
            unique: &[fields::EMAIL],
        },
    };

    pub fn from_document(doc: Document) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    /// Inserts a user
    ///
    /// # Errors
    ///
    /// - `StoreError::Duplicate` if the email is taken
    /// - `StoreError::Validation` if name or email is empty
    pub async fn create(store: &dyn DocumentStore, data: &CreateUser) -> StoreResult<Self> {
        let doc = store.insert(&Self::COLLECTION, data.to_document()).await?;
        Self::from_document(doc)
    }

    pub async fn find_by_id(store: &dyn DocumentStore, id: Uuid) -> StoreResult<Option<Self>> {
        store
            .find_by_id(&Self::COLLECTION, id)
            .await?
            .map(Self::from_document)
            .transpose()
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
}
