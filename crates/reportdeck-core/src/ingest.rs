//! Upload ingestion pipeline.
//!
//! A run row is created in `uploading` before any processing and always leaves
//! that state: either through [`Store::complete_run`] with the computed
//! aggregates, or through [`Store::mark_partial`] when a pipeline step fails.
//! The scratch directory is removed in both cases.

use crate::archive::{
    extract_archive, find_dirs, find_files, ArchiveLimits, DirMatch, ExtractSummary, FileMatch,
};
use crate::errors::IngestError;
use crate::model::{NewTestCase, RunFinalization, RunStatus, UploadMeta};
use crate::parsers::{parse_junit, parse_lcov, CoverageSummary, JunitReport};
use crate::reports::{copy_dir_recursive, is_valid_run_id, ReportLayout, RESULTS_XML};
use crate::storage::Store;
use crate::videos::{find_video_for_test, retain_videos, FailedTests};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const LCOV_FILE: &str = "lcov.info";
pub const MONOCART_MARKER: &str = "monocart-report";
pub const COVERAGE_HTML_MARKER: &str = "lcov-report";
pub const TEST_RESULTS_DIR: &str = "test-results";

const SCRATCH_PREFIX: &str = "reportdeck-upload-";
const ARCHIVE_FILE: &str = "upload.tar.gz";
const EXTRACT_DIR: &str = "extracted";

/// Upload fields as received, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawUpload {
    pub archive: Option<Vec<u8>>,
    pub run_id: Option<String>,
    pub github_run_id: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub phase: Option<String>,
    pub pr_number: Option<String>,
    pub triggered_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub meta: UploadMeta,
    pub archive: Vec<u8>,
}

impl RawUpload {
    /// Check required fields and the run id. Nothing is persisted on failure.
    pub fn into_request(self) -> Result<UploadRequest, IngestError> {
        fn present(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.is_empty())
        }

        let run_id = present(self.run_id);
        let github_run_id = present(self.github_run_id);
        let branch = present(self.branch);
        let commit_sha = present(self.commit_sha);
        let phase = present(self.phase);

        let mut missing = Vec::new();
        if self.archive.is_none() {
            missing.push("archive");
        }
        if run_id.is_none() {
            missing.push("run_id");
        }
        if github_run_id.is_none() {
            missing.push("github_run_id");
        }
        if branch.is_none() {
            missing.push("branch");
        }
        if commit_sha.is_none() {
            missing.push("commit_sha");
        }
        if phase.is_none() {
            missing.push("phase");
        }

        let (
            Some(archive),
            Some(run_id),
            Some(github_run_id),
            Some(branch),
            Some(commit_sha),
            Some(phase),
        ) = (self.archive, run_id, github_run_id, branch, commit_sha, phase)
        else {
            return Err(IngestError::MissingFields(missing));
        };

        if !is_valid_run_id(&run_id) {
            return Err(IngestError::InvalidRunId(run_id));
        }

        let pr_number = self
            .pr_number
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok());

        Ok(UploadRequest {
            meta: UploadMeta {
                run_id,
                github_run_id,
                branch,
                commit_sha,
                phase,
                pr_number,
                triggered_by: present(self.triggered_by),
            },
            archive,
        })
    }
}

/// Upload response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub total_tests: i64,
    pub coverage: Option<f64>,
}

#[derive(Clone)]
pub struct Ingestor {
    store: Store,
    layout: ReportLayout,
    limits: ArchiveLimits,
    scratch_root: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(store: Store, layout: ReportLayout) -> Self {
        Self {
            store,
            layout,
            limits: ArchiveLimits::default(),
            scratch_root: None,
        }
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }

    /// Run the whole pipeline for one upload. Blocking; call from a worker thread.
    pub fn ingest(&self, request: UploadRequest) -> Result<IngestOutcome, IngestError> {
        let UploadRequest { meta, archive } = request;
        let run_id = meta.run_id.clone();

        let scratch = self.scratch_dir()?;
        let archive_path = scratch.path().join(ARCHIVE_FILE);
        fs::write(&archive_path, &archive)?;
        let upload_size = archive.len() as u64;
        drop(archive);

        let result = match self.store.begin_run(&meta, upload_size) {
            Ok(()) => {
                tracing::info!(run_id = %run_id, branch = %meta.branch, phase = %meta.phase, bytes = upload_size, "ingesting upload");
                let result = self.process(&run_id, scratch.path(), &archive_path);
                if let Err(err) = &result {
                    tracing::error!(run_id = %run_id, error = %err, "upload processing failed");
                    self.abandon_run(&run_id);
                }
                result
            }
            Err(e) => {
                let err = IngestError::from(e);
                tracing::error!(run_id = %run_id, error = %err, "failed to record run");
                Err(err)
            }
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(dir = %scratch_path.display(), error = %e, "failed to remove scratch directory");
        }

        result
    }

    /// Resolve a failed run as `partial` with no stored artifacts, so its
    /// presence flags (all unset) agree with the reports directory.
    fn abandon_run(&self, run_id: &str) {
        if let Err(e) = self.layout.remove_run_dir(run_id) {
            tracing::warn!(run_id, error = %e, "failed to remove partial run directory");
        }
        if let Err(e) = self.store.mark_partial(run_id) {
            tracing::error!(run_id, error = %format!("{e:#}"), "failed to mark run partial");
        }
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        match &self.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }

    fn process(
        &self,
        run_id: &str,
        scratch: &Path,
        archive_path: &Path,
    ) -> Result<IngestOutcome, IngestError> {
        let extracted = scratch.join(EXTRACT_DIR);
        fs::create_dir_all(&extracted)?;
        let summary: ExtractSummary = extract_archive(archive_path, &extracted, &self.limits)?;
        tracing::debug!(
            run_id,
            files = summary.files,
            dirs = summary.dirs,
            bytes = summary.bytes_written,
            "archive extracted"
        );
        if !summary.skipped.is_empty() {
            tracing::warn!(run_id, skipped = summary.skipped.len(), "archive contained unsafe entries");
        }

        let junit_path = find_files(&extracted, FileMatch::Exact(RESULTS_XML))
            .into_iter()
            .next();
        let junit = junit_path.as_deref().and_then(|p| read_junit(run_id, p));

        let coverage = find_files(&extracted, FileMatch::Exact(LCOV_FILE))
            .into_iter()
            .next()
            .and_then(|p| read_lcov(run_id, &p));

        let monocart_src = find_dirs(&extracted, DirMatch::Contains(MONOCART_MARKER))
            .into_iter()
            .next();
        let coverage_src = find_dirs(&extracted, DirMatch::Contains(COVERAGE_HTML_MARKER))
            .into_iter()
            .next();

        self.layout.prepare_run_dir(run_id)?;

        if let Some(src) = &monocart_src {
            copy_dir_recursive(src, &self.layout.monocart_dir(run_id))?;
        }
        if let Some(src) = &coverage_src {
            copy_dir_recursive(src, &self.layout.coverage_dir(run_id))?;
        }
        if let Some(src) = &junit_path {
            fs::copy(src, self.layout.results_xml(run_id))?;
        }

        let failed = FailedTests::new(
            junit
                .as_ref()
                .map(JunitReport::failed_test_names)
                .unwrap_or_default(),
        );
        let videos_dir = self.layout.videos_dir(run_id);
        let has_videos = match find_dirs(&extracted, DirMatch::Exact(TEST_RESULTS_DIR))
            .into_iter()
            .next()
        {
            Some(test_results) => {
                let selection = retain_videos(&test_results, &videos_dir, &failed)?;
                tracing::debug!(
                    run_id,
                    candidates = selection.candidates,
                    retained = selection.retained.len(),
                    "videos selected"
                );
                selection.any_retained()
            }
            None => false,
        };

        let cases: Vec<NewTestCase> = junit
            .as_ref()
            .map(|report| {
                report
                    .test_cases
                    .iter()
                    .map(|tc| NewTestCase {
                        suite_name: tc.suite_name.clone(),
                        test_name: tc.test_name.clone(),
                        classname: tc.classname.clone(),
                        status: tc.status,
                        duration_ms: tc.duration_ms,
                        failure_message: tc.failure_message.clone(),
                        failure_details: tc.failure_details.clone(),
                        video_path: if has_videos {
                            find_video_for_test(&videos_dir, run_id, &tc.test_name)
                        } else {
                            None
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        let fin = finalization(
            junit.as_ref(),
            coverage.as_ref(),
            monocart_src.is_some(),
            coverage_src.is_some(),
            has_videos,
        );
        self.store.complete_run(run_id, &fin, &cases)?;

        tracing::info!(
            run_id,
            status = %fin.status,
            total = fin.total_tests,
            failed = fin.failed_tests,
            coverage = ?fin.coverage_pct,
            "run ingested"
        );

        Ok(IngestOutcome {
            run_id: run_id.to_string(),
            status: fin.status,
            total_tests: fin.total_tests,
            coverage: fin.coverage_pct,
        })
    }
}

/// `partial` without JUnit data, otherwise `failure` iff anything failed.
pub fn terminal_status(junit: Option<&JunitReport>) -> RunStatus {
    match junit {
        None => RunStatus::Partial,
        Some(r) if r.failed_tests > 0 => RunStatus::Failure,
        Some(_) => RunStatus::Success,
    }
}

fn finalization(
    junit: Option<&JunitReport>,
    coverage: Option<&CoverageSummary>,
    has_monocart: bool,
    has_coverage: bool,
    has_videos: bool,
) -> RunFinalization {
    RunFinalization {
        status: terminal_status(junit),
        total_tests: junit.map_or(0, |r| r.total_tests),
        passed_tests: junit.map_or(0, |r| r.passed_tests),
        failed_tests: junit.map_or(0, |r| r.failed_tests),
        skipped_tests: junit.map_or(0, |r| r.skipped_tests),
        duration_ms: junit.map_or(0, |r| r.duration_ms),
        coverage_pct: coverage.map(|c| c.line_coverage_pct),
        has_monocart,
        has_coverage,
        has_videos,
    }
}

fn read_junit(run_id: &str, path: &Path) -> Option<JunitReport> {
    let xml = match fs::read_to_string(path) {
        Ok(xml) => xml,
        Err(e) => {
            tracing::warn!(run_id, path = %path.display(), error = %e, "unreadable junit file");
            return None;
        }
    };
    match parse_junit(&xml) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!(run_id, path = %path.display(), error = %e, "ignoring malformed junit file");
            None
        }
    }
}

fn read_lcov(run_id: &str, path: &Path) -> Option<CoverageSummary> {
    match fs::read_to_string(path) {
        Ok(content) => Some(parse_lcov(&content)),
        Err(e) => {
            tracing::warn!(run_id, path = %path.display(), error = %e, "unreadable lcov file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawUpload {
        RawUpload {
            archive: Some(vec![1, 2, 3]),
            run_id: Some("123-1".into()),
            github_run_id: Some("123".into()),
            branch: Some("develop".into()),
            commit_sha: Some("deadbeef".into()),
            phase: Some("e2e".into()),
            pr_number: Some("42".into()),
            triggered_by: Some("".into()),
        }
    }

    #[test]
    fn valid_upload_becomes_request() {
        let req = raw().into_request().unwrap();
        assert_eq!(req.meta.run_id, "123-1");
        assert_eq!(req.meta.pr_number, Some(42));
        assert_eq!(req.meta.triggered_by, None);
        assert_eq!(req.archive, vec![1, 2, 3]);
    }

    #[test]
    fn missing_fields_are_listed() {
        let mut upload = raw();
        upload.archive = None;
        upload.branch = Some(String::new());
        match upload.into_request() {
            Err(IngestError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["archive", "branch"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unsafe_run_id_is_rejected() {
        let mut upload = raw();
        upload.run_id = Some("../../etc".into());
        assert!(matches!(
            upload.into_request(),
            Err(IngestError::InvalidRunId(_))
        ));
    }

    #[test]
    fn unparsable_pr_number_is_absent() {
        let mut upload = raw();
        upload.pr_number = Some("abc".into());
        assert_eq!(upload.into_request().unwrap().meta.pr_number, None);
    }

    #[test]
    fn status_rule() {
        assert_eq!(terminal_status(None), RunStatus::Partial);
        let ok = JunitReport {
            total_tests: 3,
            passed_tests: 3,
            ..Default::default()
        };
        assert_eq!(terminal_status(Some(&ok)), RunStatus::Success);
        let bad = JunitReport {
            total_tests: 3,
            passed_tests: 2,
            failed_tests: 1,
            ..Default::default()
        };
        assert_eq!(terminal_status(Some(&bad)), RunStatus::Failure);
    }

    #[test]
    fn zero_coverage_is_recorded() {
        let cov = CoverageSummary {
            line_coverage_pct: 0.0,
            lines_found: 0,
            lines_hit: 0,
        };
        let fin = finalization(None, Some(&cov), false, false, false);
        assert_eq!(fin.coverage_pct, Some(0.0));
        assert_eq!(fin.status, RunStatus::Partial);
        assert_eq!(finalization(None, None, false, false, false).coverage_pct, None);
    }
}
