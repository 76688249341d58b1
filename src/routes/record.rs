//! Generic table routes. The table name is a path segment validated by the store.

use crate::handlers::record::{create, delete, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn record_routes(state: AppState) -> Router {
    Router::new()
        .route("/:table", get(list).post(create))
        .route("/:table/:id", get(read).put(update).delete(delete))
        .with_state(state)
}
