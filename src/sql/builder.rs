//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for an arbitrary table.
//!
//! Table and column names are validated against the identifier grammar and quoted;
//! every value travels as a bound parameter. All generic statements address the
//! primary key as a column literally named `id`.

use crate::db::Backend;
use crate::error::AppError;
use crate::sql::ident::{validate_all, validate_identifier};
use crate::sql::params::BindValue;
use std::collections::BTreeMap;

pub const ID_COLUMN: &str = "id";

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
    backend: Backend,
}

impl QueryBuf {
    fn new(backend: Backend) -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            backend,
        }
    }

    /// Push a parameter and return its placeholder. `Null` becomes the literal `NULL`
    /// so typed backends never see an untyped null parameter.
    fn push_param(&mut self, v: BindValue) -> String {
        if v.is_null() {
            return "NULL".to_string();
        }
        self.params.push(v);
        self.backend.placeholder(self.params.len())
    }

    /// `<col> = <ph>` comparing as text, for query-string and path values.
    fn push_text_eq(&mut self, column: &str, v: &str) -> String {
        let lhs = self.backend.text_comparable(&self.backend.quote_ident(column));
        let ph = self.push_param(BindValue::from(v));
        format!("{} = {}", lhs, ph)
    }
}

fn table_ident(backend: Backend, table: &str) -> Result<String, AppError> {
    Ok(backend.quote_ident(validate_identifier(table)?))
}

/// Validate a payload's column names and convert its values.
pub fn payload_columns(
    payload: &BTreeMap<String, serde_json::Value>,
) -> Result<Vec<(&str, BindValue)>, AppError> {
    let mut out = Vec::with_capacity(payload.len());
    for (k, v) in payload {
        out.push((validate_identifier(k)?, BindValue::from_json(v)?));
    }
    Ok(out)
}

/// `SELECT * FROM t WHERE 1=1 [AND col = ? ...]`, filters in key order.
pub fn select_list(
    backend: Backend,
    table: &str,
    filters: &BTreeMap<String, String>,
) -> Result<QueryBuf, AppError> {
    let table = table_ident(backend, table)?;
    validate_all(filters.keys().map(String::as_str))?;
    let mut q = QueryBuf::new(backend);
    let mut sql = format!("SELECT * FROM {} WHERE 1=1", table);
    for (col, val) in filters {
        let cond = q.push_text_eq(col, val);
        sql.push_str(" AND ");
        sql.push_str(&cond);
    }
    q.sql = sql;
    Ok(q)
}

pub fn select_by_id(backend: Backend, table: &str, id: &str) -> Result<QueryBuf, AppError> {
    let table = table_ident(backend, table)?;
    let mut q = QueryBuf::new(backend);
    let cond = q.push_text_eq(ID_COLUMN, id);
    q.sql = format!("SELECT * FROM {} WHERE {}", table, cond);
    Ok(q)
}

/// INSERT of the payload columns. On PostgreSQL the generated id comes back via
/// `RETURNING`; on SQLite callers read the rowid the driver reports for the statement.
pub fn insert(
    backend: Backend,
    table: &str,
    payload: &BTreeMap<String, serde_json::Value>,
) -> Result<QueryBuf, AppError> {
    let table = table_ident(backend, table)?;
    let columns = payload_columns(payload)?;
    if columns.is_empty() {
        return Err(AppError::EmptyPayload);
    }
    let mut q = QueryBuf::new(backend);
    let mut cols = Vec::with_capacity(columns.len());
    let mut placeholders = Vec::with_capacity(columns.len());
    for (name, val) in columns {
        cols.push(backend.quote_ident(name));
        placeholders.push(q.push_param(val));
    }
    let returning = match backend {
        Backend::Postgres => format!(" RETURNING {}", backend.quote_ident(ID_COLUMN)),
        Backend::Sqlite => String::new(),
    };
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        returning
    );
    Ok(q)
}

/// UPDATE by id. An `id` key in the payload is ignored; nothing left to set is an error.
pub fn update(
    backend: Backend,
    table: &str,
    id: &str,
    payload: &BTreeMap<String, serde_json::Value>,
) -> Result<QueryBuf, AppError> {
    let table = table_ident(backend, table)?;
    let columns = payload_columns(payload)?;
    let mut q = QueryBuf::new(backend);
    let mut sets = Vec::with_capacity(columns.len());
    for (name, val) in columns {
        if name == ID_COLUMN {
            continue;
        }
        let ph = q.push_param(val);
        sets.push(format!("{} = {}", backend.quote_ident(name), ph));
    }
    if sets.is_empty() {
        return Err(AppError::EmptyPayload);
    }
    let cond = q.push_text_eq(ID_COLUMN, id);
    q.sql = format!("UPDATE {} SET {} WHERE {}", table, sets.join(", "), cond);
    Ok(q)
}

pub fn delete(backend: Backend, table: &str, id: &str) -> Result<QueryBuf, AppError> {
    let table = table_ident(backend, table)?;
    let mut q = QueryBuf::new(backend);
    let cond = q.push_text_eq(ID_COLUMN, id);
    q.sql = format!("DELETE FROM {} WHERE {}", table, cond);
    Ok(q)
}
