use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "reportdeck",
    version,
    about = "CI test-report dashboard: ingests test artifacts and serves run history"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "REPORTDECK_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Root for the database and stored reports
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// SQLite database file (defaults to <data-dir>/reports.db)
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Bearer token required for uploads, deletion and cleanup. Unset = open.
    #[arg(long, env = "UPLOAD_TOKEN", hide_env_values = true)]
    pub upload_token: Option<String>,

    #[arg(long, env = "GITHUB_CLIENT_ID")]
    pub github_client_id: Option<String>,

    #[arg(long, env = "GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub github_client_secret: Option<String>,

    /// Session signing key; the OAuth client secret is used when unset
    #[arg(long, env = "AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: Option<String>,

    /// Token for pull request lookups during cleanup
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Repository whose pull requests are checked, as `owner/name`
    #[arg(long, env = "GITHUB_REPO")]
    pub github_repo: Option<String>,

    #[arg(long, env = "REPORTDECK_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "REPORTDECK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Settings after defaults and fallbacks are applied.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub reports_dir: PathBuf,
    pub upload_token: Option<String>,
    /// Present only when both OAuth client id and secret are configured.
    pub session_secret: Option<String>,
    pub github: Option<GithubSettings>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub token: String,
    pub repo: String,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let db_path = cli
            .db_path
            .unwrap_or_else(|| cli.data_dir.join("reports.db"));
        let reports_dir = cli.data_dir.join("reports");

        let client_id = non_empty(cli.github_client_id);
        let client_secret = non_empty(cli.github_client_secret);
        let session_secret = match (client_id, client_secret) {
            (Some(_), Some(secret)) => Some(non_empty(cli.auth_secret).unwrap_or(secret)),
            _ => None,
        };

        let github = match (non_empty(cli.github_token), non_empty(cli.github_repo)) {
            (Some(token), Some(repo)) => Some(GithubSettings { token, repo }),
            _ => None,
        };

        Self {
            listen: cli.listen,
            data_dir: cli.data_dir,
            db_path,
            reports_dir,
            upload_token: non_empty(cli.upload_token),
            session_secret,
            github,
            max_upload_bytes: cli.max_upload_bytes,
        }
    }
}
