use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reportdeck_core::cleanup::sweep_closed_prs;
use serde_json::json;

/// `POST /api/cleanup`: drop report files of runs whose pull request closed.
pub async fn cleanup(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(source) = state.pr_states.clone() else {
        return Ok(Json(json!({
            "message": "GITHUB_TOKEN or GITHUB_REPO not configured; cleanup disabled."
        }))
        .into_response());
    };

    let report = sweep_closed_prs(state.store(), state.layout(), source.as_ref()).await?;
    tracing::info!(
        cleaned = report.cleaned,
        errors = report.errors,
        prs_checked = report.prs_checked,
        "cleanup sweep finished"
    );
    Ok(Json(report).into_response())
}
