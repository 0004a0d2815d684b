use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reportdeck_core::reports::{content_type_for, ResolveError};
use serde_json::json;

const CACHE_CONTROL: &str = "public, max-age=3600";

/// `GET /reports/*path`: stored report files, confined to the reports root.
pub async fn serve_report(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let resolved = match state.layout().resolve(&path) {
        Ok(p) => p,
        Err(ResolveError::Forbidden) => {
            tracing::warn!(path = %path, "rejected report path outside reports root");
            return (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))).into_response();
        }
        Err(ResolveError::NotFound) => {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response();
        }
    };

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, content_type_for(&resolved)),
                (header::CACHE_CONTROL, CACHE_CONTROL),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(path = %resolved.display(), error = %e, "failed to read report file");
            (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
        }
    }
}
