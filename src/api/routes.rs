use axum::routing::get;
use axum::Router;

use crate::api::handlers::{self, AppState};
use crate::store::Store;

/// All routes live under `/api/v1`.
pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/v1/", get(handlers::ping))
        .route("/api/v1/ping", get(handlers::ping))
        .route("/api/v1/tables", get(handlers::list_tables::<S>))
        .route(
            "/api/v1/tables/:table",
            get(handlers::list_records::<S>).post(handlers::upsert_record::<S>),
        )
        .route("/api/v1/tables/:table/:id", get(handlers::get_record::<S>))
}
