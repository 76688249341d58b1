//! Generic CRUD execution over any table the database knows about.

use super::decode::{pg_row_to_json, sqlite_row_to_json};
use crate::db::{Backend, ConnectionProvider, DbConnection};
use crate::error::AppError;
use crate::sql::{self, bind_all, QueryBuf};
use serde_json::{Map, Value};
use sqlx::{Postgres, Sqlite};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A row as returned to clients: column name -> scalar, in select order.
pub type Row = Map<String, Value>;

/// Stateless translator from (operation, table, params) to SQL. Each call opens its
/// own native connection and holds it only for that statement.
#[derive(Clone)]
pub struct RecordStore {
    provider: Arc<dyn ConnectionProvider>,
}

impl RecordStore {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        RecordStore { provider }
    }

    pub fn backend(&self) -> Backend {
        self.provider.backend()
    }

    /// All rows matching every filter (exact match). No filters returns the whole table.
    pub async fn list(
        &self,
        table: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<Row>, AppError> {
        let q = sql::select_list(self.backend(), table, filters)?;
        let mut conn = self.provider.open_native().await?;
        Self::query_many(&mut conn, &q).await
    }

    /// Row whose `id` column equals `id`, or None.
    pub async fn get_by_id(&self, table: &str, id: &str) -> Result<Option<Row>, AppError> {
        let q = sql::select_by_id(self.backend(), table, id)?;
        let mut conn = self.provider.open_native().await?;
        Self::query_one(&mut conn, &q).await
    }

    /// Insert one row and return the id the database generated for it.
    pub async fn insert(
        &self,
        table: &str,
        payload: &BTreeMap<String, Value>,
    ) -> Result<Value, AppError> {
        let q = sql::insert(self.backend(), table, payload)?;
        let mut conn = self.provider.open_native().await?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "insert");
        match &mut conn {
            DbConnection::Sqlite(c) => {
                let done = bind_all(sqlx::query::<Sqlite>(&q.sql), &q.params)
                    .execute(&mut *c)
                    .await?;
                Ok(Value::from(done.last_insert_rowid()))
            }
            DbConnection::Postgres(c) => {
                let row = bind_all(sqlx::query::<Postgres>(&q.sql), &q.params)
                    .fetch_one(&mut *c)
                    .await?;
                Ok(pg_row_to_json(&row)
                    .get(sql::ID_COLUMN)
                    .cloned()
                    .unwrap_or(Value::Null))
            }
        }
    }

    /// Update the row with this id. Returns rows affected (0 when the id is absent).
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        payload: &BTreeMap<String, Value>,
    ) -> Result<u64, AppError> {
        let q = sql::update(self.backend(), table, id, payload)?;
        let mut conn = self.provider.open_native().await?;
        Self::execute(&mut conn, &q).await
    }

    pub async fn delete(&self, table: &str, id: &str) -> Result<u64, AppError> {
        let q = sql::delete(self.backend(), table, id)?;
        let mut conn = self.provider.open_native().await?;
        Self::execute(&mut conn, &q).await
    }

    async fn query_many(conn: &mut DbConnection, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        Ok(match conn {
            DbConnection::Sqlite(c) => bind_all(sqlx::query::<Sqlite>(&q.sql), &q.params)
                .fetch_all(&mut *c)
                .await?
                .iter()
                .map(sqlite_row_to_json)
                .collect(),
            DbConnection::Postgres(c) => bind_all(sqlx::query::<Postgres>(&q.sql), &q.params)
                .fetch_all(&mut *c)
                .await?
                .iter()
                .map(pg_row_to_json)
                .collect(),
        })
    }

    async fn query_one(conn: &mut DbConnection, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        Ok(match conn {
            DbConnection::Sqlite(c) => bind_all(sqlx::query::<Sqlite>(&q.sql), &q.params)
                .fetch_optional(&mut *c)
                .await?
                .as_ref()
                .map(sqlite_row_to_json),
            DbConnection::Postgres(c) => bind_all(sqlx::query::<Postgres>(&q.sql), &q.params)
                .fetch_optional(&mut *c)
                .await?
                .as_ref()
                .map(pg_row_to_json),
        })
    }

    async fn execute(conn: &mut DbConnection, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        Ok(match conn {
            DbConnection::Sqlite(c) => bind_all(sqlx::query::<Sqlite>(&q.sql), &q.params)
                .execute(&mut *c)
                .await?
                .rows_affected(),
            DbConnection::Postgres(c) => bind_all(sqlx::query::<Postgres>(&q.sql), &q.params)
                .execute(&mut *c)
                .await?
                .rows_affected(),
        })
    }
}
