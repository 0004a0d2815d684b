use crate::auth::AuthSettings;
use crate::config::ServerConfig;
use crate::error::ApiError;
use anyhow::Context;
use reportdeck_core::archive::{ArchiveLimits, ArchiveLimitsOverrides};
use reportdeck_core::cleanup::{GithubPrStates, PrStateSource};
use reportdeck_core::{Ingestor, ReportLayout, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub auth: AuthSettings,
    /// `None` disables the cleanup endpoint.
    pub pr_states: Option<Arc<dyn PrStateSource>>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(ingestor: Ingestor, auth: AuthSettings) -> Self {
        Self {
            ingestor,
            auth,
            pr_states: None,
            max_upload_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_pr_states(mut self, source: Arc<dyn PrStateSource>) -> Self {
        self.pr_states = Some(source);
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Open the store, create the reports root and wire everything from config.
    pub fn from_config(cfg: &ServerConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&cfg.reports_dir).with_context(|| {
            format!("failed to create reports dir {}", cfg.reports_dir.display())
        })?;
        let store = Store::open(&cfg.db_path)?;
        store.init_schema()?;

        let limits = ArchiveLimits::default().apply(ArchiveLimitsOverrides {
            max_archive_bytes: Some(cfg.max_upload_bytes as u64),
            ..Default::default()
        });
        let ingestor =
            Ingestor::new(store, ReportLayout::new(&cfg.reports_dir)).with_limits(limits);
        let auth = AuthSettings::new(cfg.upload_token.clone(), cfg.session_secret.clone());
        let mut state = Self::new(ingestor, auth).with_max_upload_bytes(cfg.max_upload_bytes);

        if let Some(gh) = &cfg.github {
            let source = GithubPrStates::new(gh.repo.clone(), gh.token.clone())?;
            state = state.with_pr_states(Arc::new(source));
        }
        Ok(state)
    }

    pub fn store(&self) -> &Store {
        self.ingestor.store()
    }

    pub fn layout(&self) -> &ReportLayout {
        self.ingestor.layout()
    }

    /// Run a store query on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Store) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store().clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use clap::Parser;

    #[test]
    fn from_config_prepares_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let cli = Cli::try_parse_from([
            "reportdeck",
            "--data-dir",
            data.to_str().unwrap(),
            "--max-upload-bytes",
            "1024",
        ])
        .unwrap();
        let cfg = ServerConfig::from(cli);
        let state = AppState::from_config(&cfg).unwrap();

        assert!(data.join("reports").is_dir());
        assert!(data.join("reports.db").is_file());
        assert_eq!(state.max_upload_bytes, 1024);
        assert_eq!(state.store().count_runs().unwrap(), 0);
    }
}
