//! End-to-end ingestion tests: archives are built in memory, ingested into a
//! file-backed store and a temporary reports root, then inspected.

use flate2::write::GzEncoder;
use flate2::Compression;
use reportdeck_core::model::{RunStatus, TestStatus};
use reportdeck_core::{IngestError, Ingestor, RawUpload, ReportLayout, Store};
use std::sync::Arc;
use std::thread;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

const RESULTS_ONE_FAILURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="auth" tests="2">
    <testcase name="Login flow fails" classname="auth.login" time="1.5">
      <failure message="expected 200">stack trace here</failure>
    </testcase>
    <testcase name="Signup succeeds" classname="auth.signup" time="0.25"/>
  </testsuite>
</testsuites>
"#;

const RESULTS_ALL_PASS: &str = r#"<testsuite name="smoke">
  <testcase name="Home loads" time="0.1"/>
</testsuite>
"#;

const LCOV_75: &str = "SF:src/a.ts\nLF:60\nLH:40\nend_of_record\nSF:src/b.ts\nLF:40\nLH:35\nend_of_record\n";

struct Fixture {
    dir: TempDir,
    ingestor: Ingestor,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("db/reports.db")).unwrap();
        store.init_schema().unwrap();
        let layout = ReportLayout::new(dir.path().join("reports"));
        let ingestor = Ingestor::new(store, layout).with_scratch_root(dir.path().join("scratch"));
        Self {
            dir,
            ingestor,
        }
    }

    fn store(&self) -> &Store {
        self.ingestor.store()
    }

    fn layout(&self) -> &ReportLayout {
        self.ingestor.layout()
    }

    fn scratch_is_empty(&self) -> bool {
        let root = self.dir.path().join("scratch");
        std::fs::read_dir(root)
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }
}

fn targz(files: &[(&str, &str)]) -> Vec<u8> {
    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(enc);
    for (path, data) in files {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn upload(run_id: &str, archive: Vec<u8>) -> RawUpload {
    RawUpload {
        archive: Some(archive),
        run_id: Some(run_id.to_string()),
        github_run_id: Some("777".to_string()),
        branch: Some("develop".to_string()),
        commit_sha: Some("0123abcd".to_string()),
        phase: Some("e2e".to_string()),
        pr_number: Some("42".to_string()),
        triggered_by: Some("ci-bot".to_string()),
    }
}

#[test]
fn failing_run_with_coverage() {
    let fx = Fixture::new();
    let archive = targz(&[
        ("artifacts/results.xml", RESULTS_ONE_FAILURE),
        ("artifacts/coverage/lcov.info", LCOV_75),
        ("artifacts/monocart-report/index.html", "<html></html>"),
        ("artifacts/coverage/lcov-report/index.html", "<html></html>"),
    ]);

    let req = upload("777-1", archive).into_request().unwrap();
    let outcome = fx.ingestor.ingest(req).unwrap();

    let body = serde_json::to_value(&outcome).unwrap();
    assert_eq!(body["runId"], "777-1");
    assert_eq!(body["status"], "failure");
    assert_eq!(body["totalTests"], 2);
    assert_eq!(body["coverage"], 75.0);

    let run = fx.store().get_run("777-1").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failure);
    assert_eq!(run.failed_tests, 1);
    assert_eq!(run.passed_tests, 1);
    assert_eq!(run.duration_ms, 1750);
    assert_eq!(run.coverage_pct, Some(75.0));
    assert_eq!(run.pr_number, Some(42));
    assert!(run.has_monocart);
    assert!(run.has_coverage);
    assert!(!run.has_videos);
    assert!(run.upload_size_bytes > 0);

    let cases = fx.store().test_cases_for_run("777-1").unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].status, TestStatus::Failed);
    assert_eq!(cases[0].failure_message.as_deref(), Some("expected 200"));
    assert_eq!(cases[0].failure_details.as_deref(), Some("stack trace here"));

    let layout = fx.layout();
    assert!(layout.monocart_dir("777-1").join("index.html").is_file());
    assert!(layout.coverage_dir("777-1").join("index.html").is_file());
    assert!(layout.results_xml("777-1").is_file());
    assert!(fx.scratch_is_empty());
}

#[test]
fn passing_run_is_success() {
    let fx = Fixture::new();
    let archive = targz(&[("results.xml", RESULTS_ALL_PASS)]);
    let outcome = fx
        .ingestor
        .ingest(upload("r-pass", archive).into_request().unwrap())
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.total_tests, 1);
    assert_eq!(outcome.coverage, None);

    let run = fx.store().get_run("r-pass").unwrap().unwrap();
    assert!(!run.has_monocart);
    assert!(!run.has_coverage);
}

#[test]
fn no_junit_is_partial_and_keeps_all_videos() {
    let fx = Fixture::new();
    let archive = targz(&[
        ("test-results/login-flow-fails-chromium/video.webm", "v1"),
        ("test-results/signup-succeeds/video.webm", "v2"),
    ]);
    let outcome = fx
        .ingestor
        .ingest(upload("r-partial", archive).into_request().unwrap())
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert_eq!(outcome.total_tests, 0);

    let run = fx.store().get_run("r-partial").unwrap().unwrap();
    assert!(run.has_videos);
    let videos = fx.layout().videos_dir("r-partial");
    assert!(videos.join("login-flow-fails-chromium-video.webm").is_file());
    assert!(videos.join("signup-succeeds-video.webm").is_file());
}

#[test]
fn only_failed_test_videos_are_kept_and_linked() {
    let fx = Fixture::new();
    let archive = targz(&[
        ("results.xml", RESULTS_ONE_FAILURE),
        ("test-results/login-flow-fails-chromium/video.webm", "v1"),
        ("test-results/signup-succeeds-chromium/video.webm", "v2"),
    ]);
    fx.ingestor
        .ingest(upload("r-vid", archive).into_request().unwrap())
        .unwrap();

    let videos = fx.layout().videos_dir("r-vid");
    assert!(videos.join("login-flow-fails-chromium-video.webm").is_file());
    assert!(!videos.join("signup-succeeds-chromium-video.webm").exists());

    let cases = fx.store().test_cases_for_run("r-vid").unwrap();
    let failed = cases.iter().find(|c| c.test_name == "Login flow fails").unwrap();
    assert!(failed.has_video);
    assert_eq!(
        failed.video_path.as_deref(),
        Some("/reports/r-vid/videos/login-flow-fails-chromium-video.webm")
    );
    let passed = cases.iter().find(|c| c.test_name == "Signup succeeds").unwrap();
    assert!(!passed.has_video);
}

#[test]
fn malformed_junit_counts_as_missing() {
    let fx = Fixture::new();
    let archive = targz(&[("results.xml", "<testsuite><testcase")]);
    let outcome = fx
        .ingestor
        .ingest(upload("r-bad-xml", archive).into_request().unwrap())
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Partial);
    assert!(fx.layout().results_xml("r-bad-xml").is_file());
}

#[test]
fn reingest_replaces_run_and_files() {
    let fx = Fixture::new();
    let first = targz(&[
        ("results.xml", RESULTS_ONE_FAILURE),
        ("monocart-report/index.html", "old"),
    ]);
    fx.ingestor
        .ingest(upload("r-again", first).into_request().unwrap())
        .unwrap();

    let second = targz(&[("results.xml", RESULTS_ALL_PASS)]);
    let outcome = fx
        .ingestor
        .ingest(upload("r-again", second).into_request().unwrap())
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Success);

    let run = fx.store().get_run("r-again").unwrap().unwrap();
    assert_eq!(run.total_tests, 1);
    assert!(!run.has_monocart);
    assert!(!fx.layout().monocart_dir("r-again").exists());
    assert_eq!(fx.store().test_cases_for_run("r-again").unwrap().len(), 1);
    assert_eq!(fx.store().count_runs().unwrap(), 1);
}

#[test]
fn corrupt_archive_marks_run_partial() {
    let fx = Fixture::new();
    let archive = b"definitely not a tar stream\n".repeat(64);

    let err = fx
        .ingestor
        .ingest(upload("r-corrupt", archive).into_request().unwrap())
        .unwrap_err();
    assert!(!err.is_client_error());

    let run = fx.store().get_run("r-corrupt").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert!(fx.store().test_cases_for_run("r-corrupt").unwrap().is_empty());
    assert!(fx.scratch_is_empty());
}

#[test]
fn failed_commit_leaves_no_artifacts_behind() {
    let fx = Fixture::new();
    let side = rusqlite::Connection::open(fx.dir.path().join("db/reports.db")).unwrap();
    side.execute_batch(
        "CREATE TRIGGER reject_cases BEFORE INSERT ON test_cases
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .unwrap();

    let archive = targz(&[
        ("results.xml", RESULTS_ONE_FAILURE),
        ("coverage/lcov.info", LCOV_75),
        ("monocart-report/index.html", "<html></html>"),
        ("coverage/lcov-report/index.html", "<html></html>"),
        ("test-results/auth-Login-flow-fails-chromium/video.webm", "vid"),
    ]);
    let err = fx
        .ingestor
        .ingest(upload("r-commit", archive).into_request().unwrap())
        .unwrap_err();
    assert!(!err.is_client_error());

    let run = fx.store().get_run("r-commit").unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert!(fx.store().test_cases_for_run("r-commit").unwrap().is_empty());
    assert_eq!(
        run.has_monocart,
        fx.layout().monocart_dir("r-commit").exists()
    );
    assert_eq!(
        run.has_coverage,
        fx.layout().coverage_dir("r-commit").exists()
    );
    assert_eq!(run.has_videos, fx.layout().videos_dir("r-commit").exists());
    assert!(!fx.layout().results_xml("r-commit").exists());
    assert!(fx.scratch_is_empty());
}

#[test]
fn traversal_entries_never_leave_scratch() {
    let fx = Fixture::new();

    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(enc);
    let evil = b"pwned";
    let mut header = Header::new_gnu();
    let name = b"../../escape.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(evil.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();
    builder.append(&header, &evil[..]).unwrap();
    let mut ok = Header::new_gnu();
    ok.set_size(RESULTS_ALL_PASS.len() as u64);
    ok.set_mode(0o644);
    ok.set_entry_type(EntryType::Regular);
    builder
        .append_data(&mut ok, "results.xml", RESULTS_ALL_PASS.as_bytes())
        .unwrap();
    let archive = builder.into_inner().unwrap().finish().unwrap();

    let outcome = fx
        .ingestor
        .ingest(upload("r-evil", archive).into_request().unwrap())
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(!fx.dir.path().join("escape.txt").exists());
    assert!(!fx.dir.path().join("scratch/escape.txt").exists());
}

#[test]
fn invalid_request_creates_no_row() {
    let fx = Fixture::new();
    let mut raw = upload("r-missing", targz(&[]));
    raw.commit_sha = None;
    let err = raw.into_request().unwrap_err();
    assert!(matches!(err, IngestError::MissingFields(ref f) if f == &vec!["commit_sha"]));
    assert!(err.is_client_error());
    assert_eq!(fx.store().count_runs().unwrap(), 0);
}

#[test]
fn concurrent_uploads_do_not_interfere() {
    let fx = Arc::new(Fixture::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fx = fx.clone();
            thread::spawn(move || {
                let xml = if i % 2 == 0 {
                    RESULTS_ALL_PASS
                } else {
                    RESULTS_ONE_FAILURE
                };
                let archive = targz(&[("results.xml", xml)]);
                fx.ingestor
                    .ingest(upload(&format!("par-{i}"), archive).into_request().unwrap())
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }

    assert_eq!(fx.store().count_runs().unwrap(), 4);
    for i in 0..4 {
        let run = fx.store().get_run(&format!("par-{i}")).unwrap().unwrap();
        let expected = if i % 2 == 0 {
            RunStatus::Success
        } else {
            RunStatus::Failure
        };
        assert_eq!(run.status, expected);
    }
    assert!(fx.scratch_is_empty());
}
