pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id TEXT PRIMARY KEY,
  github_run_id TEXT NOT NULL,
  branch TEXT NOT NULL,
  commit_sha TEXT NOT NULL,
  pr_number INTEGER,
  triggered_by TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
  status TEXT NOT NULL DEFAULT 'uploading',
  total_tests INTEGER NOT NULL DEFAULT 0,
  passed_tests INTEGER NOT NULL DEFAULT 0,
  failed_tests INTEGER NOT NULL DEFAULT 0,
  skipped_tests INTEGER NOT NULL DEFAULT 0,
  duration_ms INTEGER NOT NULL DEFAULT 0,
  coverage_pct REAL,
  phase TEXT NOT NULL,
  has_monocart BOOLEAN NOT NULL DEFAULT 0,
  has_coverage BOOLEAN NOT NULL DEFAULT 0,
  has_videos BOOLEAN NOT NULL DEFAULT 0,
  upload_size_bytes INTEGER NOT NULL DEFAULT 0,
  reports_deleted BOOLEAN NOT NULL DEFAULT 0,
  deleted_at DATETIME
);

CREATE TABLE IF NOT EXISTS test_cases (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
  suite_name TEXT NOT NULL,
  test_name TEXT NOT NULL,
  classname TEXT,
  status TEXT NOT NULL,
  duration_ms INTEGER NOT NULL DEFAULT 0,
  failure_message TEXT,
  failure_details TEXT,
  has_video BOOLEAN NOT NULL DEFAULT 0,
  video_path TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_pr ON runs(pr_number);
CREATE INDEX IF NOT EXISTS idx_runs_branch ON runs(branch);
CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_test_cases_run ON test_cases(run_id);
"#;
