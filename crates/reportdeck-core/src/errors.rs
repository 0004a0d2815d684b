use crate::archive::ArchiveError;
use std::io;

/// Errors surfaced by [`crate::ingest::Ingestor`].
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Store(err)
    }
}

impl IngestError {
    /// Rejected before any state was touched; the caller should fix the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::MissingFields(_) | IngestError::InvalidRunId(_)
        )
    }
}
