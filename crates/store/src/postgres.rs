//! Global-region driver: `PostgreSQL` `documents` table with a `jsonb` body.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, QueryResult,
    SqlErr, Statement, Value,
};
use tracing::log::LevelFilter;
use twinchat_common::config::GlobalBackendConfig;
use twinchat_common::{AppError, AppResult, Region};

use crate::document::{Direction, Document, DocumentStore, Query, document_id};

/// `PostgreSQL`-backed document store.
#[derive(Clone)]
pub struct PostgresStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresStore {
    /// Wrap an existing connection.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Connect and run pending migrations.
    pub async fn connect(config: &GlobalBackendConfig) -> AppResult<Self> {
        let mut opt = ConnectOptions::new(&config.database_url);

        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .sqlx_logging(true)
            .sqlx_logging_level(LevelFilter::Debug);

        let db = Database::connect(opt).await.map_err(map_db_err)?;
        crate::migrate(&db).await?;

        Ok(Self::new(Arc::new(db)))
    }

    async fn fetch_one(&self, stmt: Statement) -> AppResult<Option<Document>> {
        self.db
            .query_one(stmt)
            .await
            .map_err(map_db_err)?
            .map(|row| body_of(&row))
            .transpose()
    }
}

fn map_db_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => AppError::Conflict(msg),
        _ => AppError::Storage(err.to_string()),
    }
}

fn body_of(row: &QueryResult) -> AppResult<Document> {
    match row
        .try_get::<serde_json::Value>("", "body")
        .map_err(map_db_err)?
    {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(AppError::Storage(format!(
            "document body is not an object: {other}"
        ))),
    }
}

fn json(value: serde_json::Value) -> Value {
    value.into()
}

/// Build the `SELECT` for a query. Field names are bound as parameters.
pub(crate) fn build_select(collection: &str, query: &Query) -> Statement {
    let mut values: Vec<Value> = vec![collection.into()];
    let mut sql = String::from("SELECT body FROM documents WHERE collection = $1");

    for filter in &query.filters {
        values.push(filter.field.as_str().into());
        let field_idx = values.len();
        values.push(json(filter.value.clone()));
        let value_idx = values.len();
        let _ = write!(
            sql,
            " AND body -> ${field_idx} {} ${value_idx}",
            filter.op.sql()
        );
    }

    if let Some(order) = &query.order {
        values.push(order.field.as_str().into());
        let direction = match order.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        let _ = write!(sql, " ORDER BY body -> ${} {direction}", values.len());
    }

    if let Some(limit) = query.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }

    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

#[async_trait]
impl DocumentStore for PostgresStore {
    fn region(&self) -> Region {
        Region::Global
    }

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        self.fetch_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT body FROM documents WHERE collection = $1 AND id = $2",
            [collection.into(), id.into()],
        ))
        .await
    }

    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>> {
        self.db
            .query_all(build_select(collection, query))
            .await
            .map_err(map_db_err)?
            .iter()
            .map(body_of)
            .collect()
    }

    async fn insert(&self, collection: &str, doc: Document) -> AppResult<Document> {
        let id = document_id(&doc)?.to_string();
        self.fetch_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) RETURNING body",
            [
                collection.into(),
                id.into(),
                json(serde_json::Value::Object(doc)),
            ],
        ))
        .await?
        .ok_or_else(|| AppError::Storage("insert returned no row".to_string()))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut patch: Document,
    ) -> AppResult<Option<Document>> {
        patch.remove("id");
        self.fetch_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE documents SET body = body || $3, updated_at = CURRENT_TIMESTAMP \
             WHERE collection = $1 AND id = $2 RETURNING body",
            [
                collection.into(),
                id.into(),
                json(serde_json::Value::Object(patch)),
            ],
        ))
        .await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> AppResult<Option<Document>> {
        // Single statement: the row lock makes concurrent increments serialize
        self.fetch_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE documents SET body = jsonb_set(body, ARRAY[$3::text], \
             to_jsonb(COALESCE((body ->> $3)::bigint, 0) + $4)), \
             updated_at = CURRENT_TIMESTAMP \
             WHERE collection = $1 AND id = $2 RETURNING body",
            [collection.into(), id.into(), field.into(), delta.into()],
        ))
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "DELETE FROM documents WHERE collection = $1 AND id = $2",
                [collection.into(), id.into()],
            ))
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
