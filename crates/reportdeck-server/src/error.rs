use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reportdeck_core::IngestError;
use serde_json::json;

/// Error response of the JSON API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{error}: {details}")]
    Internal { error: &'static str, details: String },
}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            error: "Internal server error",
            details: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal {
                error: "Failed to process upload",
                details: err.to_string(),
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg) => json!({ "error": msg }),
            ApiError::NotFound(msg) => json!({ "error": msg }),
            ApiError::Internal { error, details } => {
                tracing::error!(%details, "{error}");
                json!({ "error": error, "details": details })
            }
        };
        (status, Json(body)).into_response()
    }
}
