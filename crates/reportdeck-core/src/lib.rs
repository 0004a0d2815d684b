//! Core of the reportdeck CI test-report dashboard: archive ingestion, report
//! parsing, artifact layout and the run store.

pub mod archive;
pub mod cleanup;
pub mod errors;
pub mod ingest;
pub mod model;
pub mod parsers;
pub mod reports;
pub mod storage;
pub mod videos;

pub use errors::IngestError;
pub use ingest::{IngestOutcome, Ingestor, RawUpload, UploadRequest};
pub use reports::ReportLayout;
pub use storage::Store;
