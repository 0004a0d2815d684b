use serde::{Deserialize, Serialize};

/// Lifecycle of an ingested run. `Uploading` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Uploading,
    Success,
    Failure,
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Uploading => "uploading",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => RunStatus::Success,
            "failure" => RunStatus::Failure,
            "uploading" => RunStatus::Uploading,
            _ => RunStatus::Partial,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Uploading)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
            TestStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "failed" => TestStatus::Failed,
            "skipped" => TestStatus::Skipped,
            "error" => TestStatus::Error,
            _ => TestStatus::Passed,
        }
    }

    /// `failed` and `error` both count toward a run's failed total.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Error)
    }
}

/// Metadata supplied alongside an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    pub run_id: String,
    pub github_run_id: String,
    pub branch: String,
    pub commit_sha: String,
    pub phase: String,
    pub pr_number: Option<i64>,
    pub triggered_by: Option<String>,
}

/// A run row as persisted in `runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub id: String,
    pub github_run_id: String,
    pub branch: String,
    pub commit_sha: String,
    pub pr_number: Option<i64>,
    pub triggered_by: Option<String>,
    pub created_at: String,
    pub status: RunStatus,
    pub total_tests: i64,
    pub passed_tests: i64,
    pub failed_tests: i64,
    pub skipped_tests: i64,
    pub duration_ms: i64,
    pub coverage_pct: Option<f64>,
    pub phase: String,
    pub has_monocart: bool,
    pub has_coverage: bool,
    pub has_videos: bool,
    pub upload_size_bytes: i64,
    pub reports_deleted: bool,
    pub deleted_at: Option<String>,
}

/// A test case row as persisted in `test_cases`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseRow {
    pub id: i64,
    pub run_id: String,
    pub suite_name: String,
    pub test_name: String,
    pub classname: Option<String>,
    pub status: TestStatus,
    pub duration_ms: i64,
    pub failure_message: Option<String>,
    pub failure_details: Option<String>,
    pub has_video: bool,
    pub video_path: Option<String>,
}

/// Test case ready for insertion; the owning run id is supplied by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTestCase {
    pub suite_name: String,
    pub test_name: String,
    pub classname: String,
    pub status: TestStatus,
    pub duration_ms: i64,
    pub failure_message: Option<String>,
    pub failure_details: Option<String>,
    pub video_path: Option<String>,
}

/// Final aggregates written when a run leaves `uploading`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFinalization {
    pub status: RunStatus,
    pub total_tests: i64,
    pub passed_tests: i64,
    pub failed_tests: i64,
    pub skipped_tests: i64,
    pub duration_ms: i64,
    pub coverage_pct: Option<f64>,
    pub has_monocart: bool,
    pub has_coverage: bool,
    pub has_videos: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunFilter {
    pub branch: Option<String>,
    pub status: Option<String>,
    pub pr_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub runs: i64,
    pub avg_pass_rate: Option<f64>,
    pub avg_coverage: Option<f64>,
    pub total_tests: i64,
    pub total_passed: i64,
    pub total_failed: i64,
}
