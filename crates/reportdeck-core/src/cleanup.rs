//! Report-file cleanup for closed pull requests.
//!
//! Run rows survive with `reports_deleted = 1` so historical statistics stay
//! intact; only the per-run directories are removed.

use crate::reports::ReportLayout;
use crate::storage::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Where pull request state comes from.
#[async_trait]
pub trait PrStateSource: Send + Sync {
    /// `Ok(None)` means the state is unknown and the PR is left alone.
    async fn is_closed(&self, pr_number: i64) -> anyhow::Result<Option<bool>>;
}

#[derive(Debug, Clone)]
pub struct GithubPrStates {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    token: String,
}

#[derive(Deserialize)]
struct PullRequest {
    state: String,
}

impl GithubPrStates {
    pub fn new(repo: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reportdeck/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn pull_url(&self, pr_number: i64) -> String {
        format!(
            "{}/repos/{}/pulls/{}",
            self.api_base.trim_end_matches('/'),
            self.repo,
            pr_number
        )
    }
}

#[async_trait]
impl PrStateSource for GithubPrStates {
    async fn is_closed(&self, pr_number: i64) -> anyhow::Result<Option<bool>> {
        let resp = self
            .client
            .get(self.pull_url(pr_number))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !resp.status().is_success() {
            tracing::debug!(pr = pr_number, status = %resp.status(), "pull request lookup failed");
            return Ok(None);
        }

        let pr: PullRequest = resp.json().await?;
        Ok(Some(pr.state == "closed"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Runs whose report files were removed.
    pub cleaned: usize,
    pub errors: usize,
    pub prs_checked: usize,
}

/// Remove report files of every run attached to a closed PR. Store and
/// filesystem work runs on the blocking pool.
pub async fn sweep_closed_prs(
    store: &Store,
    layout: &ReportLayout,
    source: &dyn PrStateSource,
) -> anyhow::Result<CleanupReport> {
    let prs = {
        let store = store.clone();
        blocking(move || store.open_pr_numbers()).await?
    };
    let mut report = CleanupReport {
        prs_checked: prs.len(),
        ..Default::default()
    };

    for pr in prs {
        match source.is_closed(pr).await {
            Ok(Some(true)) => {
                let (store, layout) = (store.clone(), layout.clone());
                match blocking(move || purge_pr(&store, &layout, pr)).await {
                    Ok(n) => {
                        tracing::info!(pr, runs = n, "removed reports for closed pull request");
                        report.cleaned += n;
                    }
                    Err(e) => {
                        tracing::error!(pr, error = %format!("{e:#}"), "failed to clean pull request");
                        report.errors += 1;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(pr, error = %format!("{e:#}"), "error checking pull request");
                report.errors += 1;
            }
        }
    }

    Ok(report)
}

async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn purge_pr(store: &Store, layout: &ReportLayout, pr: i64) -> anyhow::Result<usize> {
    let run_ids = store.run_ids_for_pr(pr)?;
    for run_id in &run_ids {
        if let Err(e) = layout.remove_run_dir(run_id) {
            tracing::warn!(pr, run_id = %run_id, error = %e, "failed to remove run directory");
        }
    }
    store.mark_reports_deleted(pr)?;
    Ok(run_ids.len())
}
