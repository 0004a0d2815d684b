use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use reportdeck_core::model::{RunFilter, RunRow, TestCaseRow};
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub branch: Option<String>,
    pub status: Option<String>,
    pub pr_number: Option<String>,
}

impl ListParams {
    fn page(&self) -> u32 {
        parse_positive(self.page.as_deref()).unwrap_or(1)
    }

    fn limit(&self) -> u32 {
        parse_positive(self.limit.as_deref())
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT)
    }

    fn filter(&self) -> RunFilter {
        RunFilter {
            branch: self.branch.clone().filter(|s| !s.is_empty()),
            status: self.status.clone().filter(|s| !s.is_empty()),
            pr_number: self
                .pr_number
                .as_deref()
                .and_then(|s| s.trim().parse().ok()),
        }
    }
}

fn parse_positive(v: Option<&str>) -> Option<u32> {
    v.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct RunList {
    pub runs: Vec<RunRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    pub run: RunRow,
    pub test_cases: Vec<TestCaseRow>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<RunList>, ApiError> {
    let page = params.page();
    let limit = params.limit();
    let filter = params.filter();

    let (runs, total) = state
        .with_store(move |store| store.list_runs(&filter, page, limit))
        .await?;

    let limit_i = i64::from(limit);
    Ok(Json(RunList {
        runs,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit_i - 1) / limit_i,
        },
    }))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunDetail>, ApiError> {
    let detail = state
        .with_store(move |store| {
            let Some(run) = store.get_run(&id)? else {
                return Ok(None);
            };
            let test_cases = store.test_cases_for_run(&id)?;
            Ok(Some(RunDetail { run, test_cases }))
        })
        .await?;

    detail.map(Json).ok_or(ApiError::NotFound("Run not found"))
}

/// `DELETE /api/runs/{id}`: drops the rows and the stored report files.
pub async fn delete_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let run_id = id.clone();
    let removed = state
        .with_store(move |store| store.delete_run(&run_id))
        .await?;
    if !removed {
        return Err(ApiError::NotFound("Run not found"));
    }

    if reportdeck_core::reports::is_valid_run_id(&id) {
        let layout = state.layout().clone();
        let dir_id = id.clone();
        let removed_dir = tokio::task::spawn_blocking(move || layout.remove_run_dir(&dir_id))
            .await
            .map_err(ApiError::internal)?;
        if let Err(e) = removed_dir {
            tracing::warn!(run_id = %id, error = %e, "failed to remove run directory");
        }
    }

    tracing::info!(run_id = %id, "run deleted");
    Ok((StatusCode::OK, Json(json!({ "success": true, "runId": id }))))
}
