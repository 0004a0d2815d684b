use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use reportdeck_core::model::TrendPoint;
use serde::{Deserialize, Serialize};

const DEFAULT_DAYS: u32 = 30;
const DEFAULT_BRANCH: &str = "develop";

#[derive(Debug, Default, Deserialize)]
pub struct TrendParams {
    pub days: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Trends {
    pub trends: Vec<TrendPoint>,
    pub branches: Vec<String>,
}

pub async fn trends(
    State(state): State<AppState>,
    Query(params): Query<TrendParams>,
) -> Result<Json<Trends>, ApiError> {
    let days = params
        .days
        .as_deref()
        .and_then(|d| d.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_DAYS);
    let branch = params
        .branch
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    let body = state
        .with_store(move |store| {
            Ok(Trends {
                trends: store.trends(days, &branch)?,
                branches: store.branches()?,
            })
        })
        .await?;
    Ok(Json(body))
}
