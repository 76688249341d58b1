//! Acknowledgement bodies for write requests.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct Created {
    pub success: bool,
    pub id: Value,
}

#[derive(Serialize)]
pub struct Ack {
    pub success: bool,
}

/// `{"success": true, "id": <id>}`
pub fn created(id: Value) -> (StatusCode, Json<Created>) {
    (StatusCode::OK, Json(Created { success: true, id }))
}

/// `{"success": true}`
pub fn ack() -> (StatusCode, Json<Ack>) {
    (StatusCode::OK, Json(Ack { success: true }))
}
