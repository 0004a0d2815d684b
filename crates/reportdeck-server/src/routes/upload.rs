use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use reportdeck_core::{IngestOutcome, RawUpload};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// `PUT /api/upload`: multipart archive plus run metadata.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut raw = RawUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "archive" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read archive: {e}")))?;
            raw.archive = Some(bytes.to_vec());
            continue;
        }

        let slot = match name.as_str() {
            "run_id" => &mut raw.run_id,
            "github_run_id" => &mut raw.github_run_id,
            "branch" => &mut raw.branch,
            "commit_sha" => &mut raw.commit_sha,
            "phase" => &mut raw.phase,
            "pr_number" => &mut raw.pr_number,
            "triggered_by" => &mut raw.triggered_by,
            _ => continue,
        };
        let text = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read field {name}: {e}")))?;
        *slot = Some(text);
    }

    let request = raw.into_request()?;
    let ingestor = state.ingestor.clone();
    let outcome = tokio::task::spawn_blocking(move || ingestor.ingest(request))
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(UploadResponse {
        success: true,
        outcome,
    }))
}
