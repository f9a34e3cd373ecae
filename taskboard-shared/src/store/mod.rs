/// Document store abstraction
///
/// The consistency engines and the HTTP layer talk to persistence only
/// through the [`DocumentStore`] trait, injected as `Arc<dyn DocumentStore>`.
/// Two backends implement it:
///
/// - [`memory::MemoryStore`]: in-process, used by tests and the default
///   `STORE_BACKEND=memory` configuration
/// - [`postgres::PgDocumentStore`]: JSONB documents in PostgreSQL
///
/// Every operation is atomic for a single document. `update_many` applies to
/// each matched document independently; nothing spans collections.
///
/// # Example
///
/// ```
/// use taskboard_shared::models::user::User;
/// use taskboard_shared::store::{memory::MemoryStore, DocumentStore, query::Filter};
///
/// # async fn example() -> Result<(), taskboard_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// let users = store.count(&User::COLLECTION, &Filter::all()).await?;
/// assert_eq!(users, 0);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;
pub mod query;
pub mod schema;
pub mod update;

use async_trait::async_trait;
use query::{Document, Filter, FindQuery};
use schema::Collection;
use thiserror::Error;
use update::Update;
use uuid::Uuid;

pub use query::QueryError;

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document failed schema validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unique constraint violated
    #[error("duplicate value for unique field {field}")]
    Duplicate { field: String },

    /// Malformed query
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Stored data could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend failure not covered by a more specific variant
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Store result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Options for [`DocumentStore::find_by_id_and_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Validate the document against its schema after applying the update
    pub run_validation: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            run_validation: true,
        }
    }
}

/// Persistence contract consumed by the consistency engines
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Checks the backend is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Finds documents matching the query
    async fn find(&self, collection: &Collection, query: &FindQuery) -> StoreResult<Vec<Document>>;

    /// Counts documents matching the filter
    async fn count(&self, collection: &Collection, filter: &Filter) -> StoreResult<u64>;

    /// Finds one document by id
    async fn find_by_id(&self, collection: &Collection, id: Uuid) -> StoreResult<Option<Document>>;

    /// Inserts a document, returning it with `_id` and defaults applied
    async fn insert(&self, collection: &Collection, doc: Document) -> StoreResult<Document>;

    /// Applies an update to one document and returns the updated document
    async fn find_by_id_and_update(
        &self,
        collection: &Collection,
        id: Uuid,
        update: &Update,
        options: UpdateOptions,
    ) -> StoreResult<Option<Document>>;

    /// Deletes one document and returns it
    async fn find_by_id_and_delete(
        &self,
        collection: &Collection,
        id: Uuid,
    ) -> StoreResult<Option<Document>>;

    /// Applies an update to every matching document, returning the match count
    async fn update_many(
        &self,
        collection: &Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64>;
}
