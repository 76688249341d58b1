//! Convert serde_json::Value to values that sqlx can bind on either backend.

use crate::error::AppError;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

/// A scalar that can be bound as a query parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl BindValue {
    /// Scalars only: arrays and objects have no column to land in.
    pub fn from_json(v: &Value) -> Result<Self, AppError> {
        Ok(match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else if let Some(f) = n.as_f64() {
                    BindValue::F64(f)
                } else {
                    return Err(AppError::BadRequest(format!("number out of range: {}", n)));
                }
            }
            Value::String(s) => BindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                return Err(AppError::BadRequest("nested values are not supported".into()))
            }
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::String(s.to_string())
    }
}

/// Bind params in order. `Null` never reaches here: the builder renders it as a literal.
pub fn bind_all<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &[BindValue],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for p in params {
        query = match p {
            BindValue::Null => query.bind(Option::<String>::None),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::I64(n) => query.bind(*n),
            BindValue::F64(n) => query.bind(*n),
            BindValue::String(s) => query.bind(s.clone()),
        };
    }
    query
}
