/// PostgreSQL document store
///
/// Each collection is a table of JSONB documents:
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY,
///     seq BIGSERIAL NOT NULL,
///     doc JSONB NOT NULL
/// );
/// CREATE UNIQUE INDEX users_email_key ON users ((doc ->> 'email'));
/// ```
///
/// Filters and sort keys are compiled to SQL over `doc -> field`; projection
/// and update operators run in Rust so their semantics match the in-memory
/// store. Single-document updates lock the row (`SELECT ... FOR UPDATE`)
/// inside a transaction.
///
/// Range operators (`$gt`, `$lt`, ...) compare scalars of the same JSON type
/// only; they do not look inside arrays.
///
/// # Example
///
/// ```no_run
/// use taskboard_shared::db::pool::{create_pool, DatabaseConfig};
/// use taskboard_shared::store::postgres::PgDocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
/// let store = PgDocumentStore::new(pool);
/// # Ok(())
/// # }
/// ```

use super::query::{Clause, Condition, Document, Filter, FindQuery, SortOrder};
use super::schema::Collection;
use super::update::Update;
use super::{DocumentStore, StoreError, StoreResult, UpdateOptions};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL-backed [`DocumentStore`]
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Table backing a collection; only tables created by the migrations are allowed
fn table(collection: &Collection) -> StoreResult<&'static str> {
    match collection.name {
        "tasks" => Ok("tasks"),
        "users" => Ok("users"),
        other => Err(StoreError::Unavailable(format!(
            "no table for collection {}",
            other
        ))),
    }
}

fn into_document(value: Value) -> StoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Unavailable(format!(
            "stored document is not an object: {}",
            other
        ))),
    }
}

/// Maps unique violations (SQLSTATE 23505) to `StoreError::Duplicate`
fn map_db_error(collection: &Collection, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or_default();
            let field = collection
                .schema
                .unique
                .iter()
                .find(|field| constraint.contains(*field))
                .copied()
                .unwrap_or("_id");
            return StoreError::Duplicate {
                field: field.to_string(),
            };
        }
    }
    StoreError::Database(err)
}

fn push_field(qb: &mut QueryBuilder<'static, Postgres>, field: &str) {
    qb.push("(doc -> ");
    qb.push_bind(field.to_string());
    qb.push(")");
}

/// Equality with array-contains semantics, never NULL
fn push_eq(qb: &mut QueryBuilder<'static, Postgres>, field: &str, value: &Value) {
    if value.is_null() {
        qb.push("(");
        push_field(qb, field);
        qb.push(" IS NULL OR ");
        push_field(qb, field);
        qb.push(" = 'null'::jsonb)");
        return;
    }

    qb.push("COALESCE(");
    push_field(qb, field);
    qb.push(" = ");
    qb.push_bind(Json(value.clone()));
    qb.push(" OR (jsonb_typeof");
    push_field(qb, field);
    qb.push(" = 'array' AND ");
    push_field(qb, field);
    qb.push(" @> jsonb_build_array(");
    qb.push_bind(Json(value.clone()));
    qb.push(")), FALSE)");
}

fn push_any_eq(qb: &mut QueryBuilder<'static, Postgres>, field: &str, values: &[Value]) {
    if values.is_empty() {
        qb.push("FALSE");
        return;
    }
    qb.push("(");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        push_eq(qb, field, value);
    }
    qb.push(")");
}

fn push_range(qb: &mut QueryBuilder<'static, Postgres>, field: &str, op: &str, bound: &Value) {
    qb.push("COALESCE(jsonb_typeof");
    push_field(qb, field);
    qb.push(" = jsonb_typeof(");
    qb.push_bind(Json(bound.clone()));
    qb.push(") AND ");
    push_field(qb, field);
    qb.push(" ");
    qb.push(op);
    qb.push(" ");
    qb.push_bind(Json(bound.clone()));
    qb.push(", FALSE)");
}

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, field: &str, condition: &Condition) {
    match condition {
        Condition::Eq(value) => push_eq(qb, field, value),
        Condition::Ne(value) => {
            qb.push("NOT ");
            push_eq(qb, field, value);
        }
        Condition::In(values) => push_any_eq(qb, field, values),
        Condition::Nin(values) => {
            qb.push("NOT ");
            push_any_eq(qb, field, values);
        }
        Condition::Gt(bound) => push_range(qb, field, ">", bound),
        Condition::Gte(bound) => push_range(qb, field, ">=", bound),
        Condition::Lt(bound) => push_range(qb, field, "<", bound),
        Condition::Lte(bound) => push_range(qb, field, "<=", bound),
        Condition::Exists(true) => {
            push_field(qb, field);
            qb.push(" IS NOT NULL");
        }
        Condition::Exists(false) => {
            push_field(qb, field);
            qb.push(" IS NULL");
        }
    }
}

fn push_joined(qb: &mut QueryBuilder<'static, Postgres>, filters: &[Filter], separator: &str) {
    qb.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        push_filter(qb, filter);
    }
    qb.push(")");
}

/// Compiles a filter into a SQL boolean expression over the `doc` column
fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &Filter) {
    if filter.clauses.is_empty() {
        qb.push("TRUE");
        return;
    }

    qb.push("(");
    for (i, clause) in filter.clauses.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        match clause {
            Clause::Field { field, condition } => push_condition(qb, field, condition),
            Clause::And(filters) => push_joined(qb, filters, " AND "),
            Clause::Or(filters) => push_joined(qb, filters, " OR "),
        }
    }
    qb.push(")");
}

fn select_query(table: &str, query: &FindQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT doc FROM {} WHERE ", table));
    push_filter(&mut qb, &query.filter);

    qb.push(" ORDER BY ");
    for (field, order) in &query.sort.keys {
        push_field(&mut qb, field);
        qb.push(match order {
            SortOrder::Ascending => " ASC NULLS FIRST, ",
            SortOrder::Descending => " DESC NULLS LAST, ",
        });
    }
    qb.push("seq ASC");

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if query.skip > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
    }
    qb
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        crate::db::pool::health_check(&self.pool).await?;
        Ok(())
    }

    async fn find(&self, collection: &Collection, query: &FindQuery) -> StoreResult<Vec<Document>> {
        let mut qb = select_query(table(collection)?, query);
        let rows: Vec<(Json<Value>,)> = qb.build_query_as().fetch_all(&self.pool).await?;

        let docs = rows
            .into_iter()
            .map(|(Json(value),)| {
                let doc = into_document(value)?;
                Ok(match &query.projection {
                    Some(projection) => projection.apply(doc),
                    None => doc,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(collection = collection.name, returned = docs.len(), "Find completed");
        Ok(docs)
    }

    async fn count(&self, collection: &Collection, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE ", table(collection)?));
        push_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_id(&self, collection: &Collection, id: Uuid) -> StoreResult<Option<Document>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", table(collection)?);
        let row: Option<(Json<Value>,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(Json(value),)| into_document(value)).transpose()
    }

    async fn insert(&self, collection: &Collection, doc: Document) -> StoreResult<Document> {
        let table = table(collection)?;
        let (id, doc) = collection.schema.prepare_insert(doc)?;

        let sql = format!("INSERT INTO {} (id, doc) VALUES ($1, $2)", table);
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(Value::Object(doc.clone())))
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(collection, e))?;

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
        let table = table(collection)?;
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT doc FROM {} WHERE id = $1 FOR UPDATE", table);
        let row: Option<(Json<Value>,)> = sqlx::query_as(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((Json(value),)) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut doc = into_document(value)?;
        update.apply(&mut doc)?;
        collection.schema.strip_unknown(&mut doc);
        if options.run_validation {
            collection.schema.validate(&doc)?;
        }

        let write = format!("UPDATE {} SET doc = $2 WHERE id = $1", table);
        sqlx::query(&write)
            .bind(id)
            .bind(Json(Value::Object(doc.clone())))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(collection, e))?;
        tx.commit().await?;

        Ok(Some(doc))
    }

    async fn find_by_id_and_delete(
        &self,
        collection: &Collection,
        id: Uuid,
    ) -> StoreResult<Option<Document>> {
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING doc", table(collection)?);
        let row: Option<(Json<Value>,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(Json(value),)| into_document(value)).transpose()
    }

    async fn update_many(
        &self,
        collection: &Collection,
        filter: &Filter,
        update: &Update,
    ) -> StoreResult<u64> {
        let table = table(collection)?;
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::new(format!("SELECT id, doc FROM {} WHERE ", table));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY seq FOR UPDATE");
        let rows: Vec<(Uuid, Json<Value>)> = qb.build_query_as().fetch_all(&mut *tx).await?;

        let write = format!("UPDATE {} SET doc = $2 WHERE id = $1", table);
        for (id, Json(value)) in &rows {
            let mut doc = into_document(value.clone())?;
            update.apply(&mut doc)?;
            collection.schema.strip_unknown(&mut doc);
            sqlx::query(&write)
                .bind(*id)
                .bind(Json(Value::Object(doc)))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_db_error(collection, e))?;
        }
        tx.commit().await?;

        debug!(collection = collection.name, matched = rows.len(), "Updated documents");
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::Sort;
    use serde_json::json;

    #[test]
    fn test_empty_filter_compiles_to_true() {
        let mut qb = QueryBuilder::new("SELECT 1 WHERE ");
        push_filter(&mut qb, &Filter::all());
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
    }

    #[test]
    fn test_filter_binds_field_names() {
        let filter = Filter::parse(&json!({"completed": false, "_id": {"$in": []}})).unwrap();
        let mut qb = QueryBuilder::new("");
        push_filter(&mut qb, &filter);
        let sql = qb.sql();

        assert!(sql.starts_with("(COALESCE((doc -> $1) = $2"));
        assert!(sql.contains(" AND FALSE)"));
        assert!(!sql.contains("completed"));
    }

    #[test]
    fn test_select_query_orders_and_windows() {
        let query = FindQuery::new(Filter::all())
            .sort(Sort::parse(&json!({"name": -1})).unwrap())
            .skip(5)
            .limit(10);
        let qb = select_query("tasks", &query);
        assert_eq!(
            qb.sql(),
            "SELECT doc FROM tasks WHERE TRUE ORDER BY (doc -> $1) DESC NULLS LAST, seq ASC LIMIT $2 OFFSET $3"
        );
    }
}
