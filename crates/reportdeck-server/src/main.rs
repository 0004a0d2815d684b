use anyhow::Context;
use clap::Parser;
use reportdeck_server::config::{Cli, LogFormat, ServerConfig};
use reportdeck_server::state::AppState;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    let cfg = ServerConfig::from(cli);

    let state = AppState::from_config(&cfg)?;
    if cfg.upload_token.is_none() {
        tracing::warn!("UPLOAD_TOKEN not set; upload and delete endpoints are open");
    }
    tracing::info!(
        data_dir = %cfg.data_dir.display(),
        db = %cfg.db_path.display(),
        sessions = cfg.session_secret.is_some(),
        cleanup = cfg.github.is_some(),
        "starting reportdeck"
    );

    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    tracing::info!(addr = %cfg.listen, "listening");

    axum::serve(listener, reportdeck_server::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
