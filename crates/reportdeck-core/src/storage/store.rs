use crate::model::{
    NewTestCase, RunFilter, RunFinalization, RunRow, RunStatus, TestCaseRow, TestStatus,
    TrendPoint, UploadMeta,
};
use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const RUN_COLUMNS: &str = "id, github_run_id, branch, commit_sha, pr_number, triggered_by, \
     created_at, status, total_tests, passed_tests, failed_tests, skipped_tests, duration_ms, \
     coverage_pct, phase, has_monocart, has_coverage, has_videos, upload_size_bytes, \
     reports_deleted, deleted_at";

const TEST_CASE_COLUMNS: &str = "id, run_id, suite_name, test_name, classname, status, \
     duration_ms, failure_message, failure_details, has_video, video_path";

/// Handle to the run/test-case database. Cloning shares the connection.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create db dir {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enable WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)
            .context("apply schema")?;
        migrate_cleanup_columns(&conn)?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection mutex poisoned"))
    }

    /// Replace any previous run with this id (and its test cases) by a fresh
    /// `uploading` row.
    pub fn begin_run(&self, meta: &UploadMeta, upload_size_bytes: u64) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        purge_run(&tx, &meta.run_id)?;
        tx.execute(
            "INSERT INTO runs (id, github_run_id, branch, commit_sha, pr_number, phase, triggered_by, status, upload_size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                meta.run_id,
                meta.github_run_id,
                meta.branch,
                meta.commit_sha,
                meta.pr_number,
                meta.phase,
                meta.triggered_by,
                RunStatus::Uploading.as_str(),
                upload_size_bytes as i64,
            ],
        )
        .context("insert run")?;
        tx.commit().context("commit run insert")?;
        Ok(())
    }

    /// Insert all test cases and move the run to its terminal status in one
    /// transaction, so readers see either the old state or the complete new one.
    pub fn complete_run(
        &self,
        run_id: &str,
        fin: &RunFinalization,
        cases: &[NewTestCase],
    ) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM test_cases WHERE run_id = ?1", params![run_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO test_cases (run_id, suite_name, test_name, classname, status, duration_ms, failure_message, failure_details, has_video, video_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for case in cases {
                stmt.execute(params![
                    run_id,
                    case.suite_name,
                    case.test_name,
                    case.classname,
                    case.status.as_str(),
                    case.duration_ms,
                    case.failure_message,
                    case.failure_details,
                    case.video_path.is_some(),
                    case.video_path,
                ])
                .context("insert test case")?;
            }
        }

        let updated = tx.execute(
            "UPDATE runs SET
               status = ?1, total_tests = ?2, passed_tests = ?3, failed_tests = ?4,
               skipped_tests = ?5, duration_ms = ?6, coverage_pct = ?7,
               has_monocart = ?8, has_coverage = ?9, has_videos = ?10
             WHERE id = ?11",
            params![
                fin.status.as_str(),
                fin.total_tests,
                fin.passed_tests,
                fin.failed_tests,
                fin.skipped_tests,
                fin.duration_ms,
                fin.coverage_pct,
                fin.has_monocart,
                fin.has_coverage,
                fin.has_videos,
                run_id,
            ],
        )?;
        if updated != 1 {
            anyhow::bail!("run {run_id} disappeared during ingestion");
        }

        tx.commit().context("commit run completion")?;
        Ok(())
    }

    pub fn mark_partial(&self, run_id: &str) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![RunStatus::Partial.as_str(), run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> anyhow::Result<Option<RunRow>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1");
        let row = conn
            .query_row(&sql, params![run_id], row_to_run)
            .optional()?;
        Ok(row)
    }

    /// One page of runs, newest first, plus the total count for the filter.
    pub fn list_runs(
        &self,
        filter: &RunFilter,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<(Vec<RunRow>, i64)> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(branch) = &filter.branch {
            conditions.push("branch = ?");
            values.push(Value::Text(branch.clone()));
        }
        if let Some(status) = &filter.status {
            conditions.push("status = ?");
            values.push(Value::Text(status.clone()));
        }
        if let Some(pr) = filter.pr_number {
            conditions.push("pr_number = ?");
            values.push(Value::Integer(pr));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM runs {where_clause}"),
            params_from_iter(values.iter()),
            |r| r.get(0),
        )?;

        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        values.push(Value::Integer(i64::from(limit)));
        values.push(Value::Integer(offset));
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs {where_clause}
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        ))?;
        let runs = stmt
            .query_map(params_from_iter(values.iter()), row_to_run)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((runs, total))
    }

    /// Failed first, then error, skipped, passed; then suite and test name.
    pub fn test_cases_for_run(&self, run_id: &str) -> anyhow::Result<Vec<TestCaseRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEST_CASE_COLUMNS} FROM test_cases WHERE run_id = ?1
             ORDER BY CASE status WHEN 'failed' THEN 0 WHEN 'error' THEN 1 WHEN 'skipped' THEN 2 ELSE 3 END,
                      suite_name, test_name"
        ))?;
        let rows = stmt
            .query_map(params![run_id], row_to_test_case)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Daily aggregates of terminal success/failure runs on `branch` over the last `days`.
    pub fn trends(&self, days: u32, branch: &str) -> anyhow::Result<Vec<TrendPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT
               date(created_at) AS day,
               COUNT(*),
               AVG(CASE WHEN total_tests > 0 THEN (passed_tests * 100.0 / total_tests) ELSE NULL END),
               AVG(coverage_pct),
               SUM(total_tests),
               SUM(passed_tests),
               SUM(failed_tests)
             FROM runs
             WHERE created_at >= datetime('now', ?1)
               AND branch = ?2
               AND status IN ('success', 'failure')
             GROUP BY day
             ORDER BY day ASC",
        )?;
        let window = format!("-{days} days");
        let rows = stmt
            .query_map(params![window, branch], |r| {
                Ok(TrendPoint {
                    date: r.get(0)?,
                    runs: r.get(1)?,
                    avg_pass_rate: r.get(2)?,
                    avg_coverage: r.get(3)?,
                    total_tests: r.get(4)?,
                    total_passed: r.get(5)?,
                    total_failed: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn branches(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT branch FROM runs ORDER BY branch")?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    pub fn count_runs(&self) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?)
    }

    /// Remove a run and its test cases. Returns whether the run existed.
    pub fn delete_run(&self, run_id: &str) -> anyhow::Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = purge_run(&tx, run_id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// PR numbers that still have report files on disk.
    pub fn open_pr_numbers(&self) -> anyhow::Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT pr_number FROM runs
             WHERE pr_number IS NOT NULL AND reports_deleted = 0
             ORDER BY pr_number",
        )?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(rows)
    }

    pub fn run_ids_for_pr(&self, pr_number: i64) -> anyhow::Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM runs WHERE pr_number = ?1 AND reports_deleted = 0 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![pr_number], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    /// Flag every run of the PR as having its files removed; statistics stay.
    pub fn mark_reports_deleted(&self, pr_number: i64) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE runs SET reports_deleted = 1, deleted_at = CURRENT_TIMESTAMP
             WHERE pr_number = ?1 AND reports_deleted = 0",
            params![pr_number],
        )?;
        Ok(n)
    }
}

fn purge_run(tx: &Transaction<'_>, run_id: &str) -> anyhow::Result<bool> {
    tx.execute("DELETE FROM test_cases WHERE run_id = ?1", params![run_id])?;
    let n = tx.execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
    Ok(n > 0)
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        github_run_id: row.get(1)?,
        branch: row.get(2)?,
        commit_sha: row.get(3)?,
        pr_number: row.get(4)?,
        triggered_by: row.get(5)?,
        created_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        status: RunStatus::parse(&row.get::<_, String>(7)?),
        total_tests: row.get(8)?,
        passed_tests: row.get(9)?,
        failed_tests: row.get(10)?,
        skipped_tests: row.get(11)?,
        duration_ms: row.get(12)?,
        coverage_pct: row.get(13)?,
        phase: row.get(14)?,
        has_monocart: row.get(15)?,
        has_coverage: row.get(16)?,
        has_videos: row.get(17)?,
        upload_size_bytes: row.get(18)?,
        reports_deleted: row.get(19)?,
        deleted_at: row.get(20)?,
    })
}

fn row_to_test_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestCaseRow> {
    Ok(TestCaseRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        suite_name: row.get(2)?,
        test_name: row.get(3)?,
        classname: row.get(4)?,
        status: TestStatus::parse(&row.get::<_, String>(5)?),
        duration_ms: row.get(6)?,
        failure_message: row.get(7)?,
        failure_details: row.get(8)?,
        has_video: row.get(9)?,
        video_path: row.get(10)?,
    })
}

/// Databases created before PR cleanup existed lack its bookkeeping columns.
fn migrate_cleanup_columns(conn: &Connection) -> anyhow::Result<()> {
    let cols = get_columns(conn, "runs")?;
    add_column_if_missing(
        conn,
        &cols,
        "runs",
        "upload_size_bytes",
        "INTEGER NOT NULL DEFAULT 0",
    )?;
    add_column_if_missing(
        conn,
        &cols,
        "runs",
        "reports_deleted",
        "BOOLEAN NOT NULL DEFAULT 0",
    )?;
    add_column_if_missing(conn, &cols, "runs", "deleted_at", "DATETIME")?;
    Ok(())
}

fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .context("prepare pragma table_info")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, []).context("alter table add column")?;
    }
    Ok(())
}
