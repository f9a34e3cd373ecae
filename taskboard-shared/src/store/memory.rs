//! In-memory document store.
//!
//! Collections are kept in insertion order behind a single
//! `tokio::sync::RwLock`, so every operation (including `update_many`) sees a
//! consistent snapshot. Data is lost when the process exits.

use super::query::{Document, Filter, FindQuery};
use super::schema::Collection;
use super::update::Update;
use super::{DocumentStore, StoreError, StoreResult, UpdateOptions};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct CollectionData {
    docs: HashMap<Uuid, Document>,
    order: Vec<Uuid>,
}

impl CollectionData {
    fn iter(&self) -> impl Iterator<Item = &Document> {
        self.order.iter().filter_map(|id| self.docs.get(id))
    }

    /// Rejects a document whose unique fields collide with another document
    fn check_unique(&self, collection: &Collection, id: Uuid, doc: &Document) -> StoreResult<()> {
        for (field, value) in collection.schema.unique_values(doc) {
            let taken = self
                .docs
                .iter()
                .any(|(other_id, other)| *other_id != id && other.get(field) == Some(value));
            if taken {
                return Err(StoreError::Duplicate {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// In-memory [`DocumentStore`]
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<&'static str, CollectionData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find(&self, collection: &Collection, query: &FindQuery) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let matched = match collections.get(collection.name) {
            Some(data) => data
                .iter()
                .filter(|doc| query.filter.matches(doc))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(query.finish(matched))
    }

    async fn count(&self, collection: &Collection, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        let count = collections
            .get(collection.name)
            .map(|data| data.iter().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find_by_id(&self, collection: &Collection, id: Uuid) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection.name)
            .and_then(|data| data.docs.get(&id))
            .cloned())
    }

    async fn insert(&self, collection: &Collection, doc: Document) -> StoreResult<Document> {
        let (id, doc) = collection.schema.prepare_insert(doc)?;

        let mut collections = self.collections.write().await;
        let data = collections.entry(collection.name).or_default();
        if data.docs.contains_key(&id) {
            return Err(StoreError::Duplicate {
                field: "_id".to_string(),
            });
        }
        data.check_unique(collection, id, &doc)?;

        data.docs.insert(id, doc.clone());
        data.order.push(id);
        debug!(collection = collection.name, %id, "Inserted document");
        Ok(doc)
    }

    async fn find_by_id_and_update(
        &self,
        collection: &Collection,
        id: Uuid,
        update: &Update,
        options: UpdateOptions,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(data) = collections.get_mut(collection.name) else {
            return Ok(None);
        };
        let Some(current) = data.docs.get(&id) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        update.apply(&mut updated)?;
        collection.schema.strip_unknown(&mut updated);
        if options.run_validation {
            collection.schema.validate(&updated)?;
        }
        data.check_unique(collection, id, &updated)?;

        data.docs.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn find_by_id_and_delete(
        &self,
        collection: &Collection,
        id: Uuid,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(data) = collections.get_mut(collection.name) else {
            return Ok(None);
        };
        let removed = data.docs.remove(&id);
        if removed.is_some() {
            data.order.retain(|other| *other != id);
        }
        Ok(removed)
    }

    async fn update_many(
        &self,
        collection: &Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(data) = collections.get_mut(collection.name) else {
            return Ok(0);
        };

        let matched: Vec<Uuid> = data
            .order
            .iter()
            .copied()
            .filter(|id| data.docs.get(id).map(|doc| filter.matches(doc)).unwrap_or(false))
            .collect();

        for id in &matched {
            let mut updated = data.docs.get(id).cloned().unwrap_or_default();
            update.apply(&mut updated)?;
            collection.schema.strip_unknown(&mut updated);
            data.check_unique(collection, *id, &updated)?;
            data.docs.insert(*id, updated);
        }

        debug!(collection = collection.name, matched = matched.len(), "Updated documents");
        Ok(matched.len() as u64)
    }
}

/// Builds a document from a JSON object literal, for tests and fixtures
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
