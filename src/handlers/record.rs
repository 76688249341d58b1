//! Table CRUD handlers: list, read, create, update, delete.

use crate::error::AppError;
use crate::response::{ack, created};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::BTreeMap;

fn body_to_map(body: Result<Json<Value>, JsonRejection>) -> Result<BTreeMap<String, Value>, AppError> {
    let Json(value) = body.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
        _ => AppError::BadRequest(e.body_text()),
    })?;
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(filters): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state.store.list(&table, &filters).await?;
    Ok(Json(rows))
}

pub async fn read(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let row = state
        .store
        .get_by_id(&table, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", table, id)))?;
    Ok(Json(row))
}

pub async fn create(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = body_to_map(body)?;
    let id = state.store.insert(&table, &payload).await?;
    Ok(created(id))
}

pub async fn update(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = body_to_map(body)?;
    let affected = state.store.update(&table, &id, &payload).await?;
    tracing::debug!(table = %table, id = %id, affected, "update");
    Ok(ack())
}

pub async fn delete(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let affected = state.store.delete(&table, &id).await?;
    tracing::debug!(table = %table, id = %id, affected, "delete");
    Ok(ack())
}
