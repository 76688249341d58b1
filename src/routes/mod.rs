//! Router assembly.

mod common;
mod record;

pub use common::common_routes;
pub use record::record_routes;

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// The full application: table CRUD under `/api`, probes at the root.
pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .nest("/api", record_routes(state.clone()))
        .merge(common_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
}
