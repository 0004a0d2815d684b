//! HTTP surface of reportdeck.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use state::AppState;

pub fn app(state: AppState) -> Router {
    let writes = Router::new()
        .route(
            "/api/upload",
            put(routes::upload::upload).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/api/runs/:id", delete(routes::runs::delete_run))
        .route("/api/cleanup", post(routes::cleanup::cleanup))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    let reads = Router::new()
        .route("/api/runs", get(routes::runs::list_runs))
        .route("/api/runs/:id", get(routes::runs::get_run))
        .route("/api/trends", get(routes::trends::trends))
        .route("/reports/*path", get(routes::reports::serve_report))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/api/health", get(routes::health::health))
        .merge(writes)
        .merge(reads)
        .with_state(state)
}
