use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use xmind_backup::config::BackupConfig;
use xmind_backup::logging;
use xmind_backup::sync::engine::{BackupEngine, EngineOptions};
use xmind_backup::sync::reconcile::Reconciler;
use xmind_core::{GithubClient, ListFolderRequest, XmindClient};

/// Back up XMind drive documents into a GitHub repository.
///
/// Credentials and targets come from the environment (GH_TOKEN, XMIND_COOKIE,
/// XMIND_FWT, GITHUB_REPOSITORY); a `.env` file is read when present.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Do not commit files whose stored content already matches
    #[arg(long)]
    skip_unchanged: bool,

    /// Seconds to wait after each file (overrides BACKUP_ITEM_DELAY_SECS)
    #[arg(long, value_name = "SECS")]
    delay_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let mut config = BackupConfig::from_env()?;
    config.skip_unchanged |= cli.skip_unchanged;
    if let Some(secs) = cli.delay_secs {
        config.item_delay = Duration::from_secs(secs);
    }
    let headers = config.provider_headers()?;

    tracing::info!(
        repository = %config.repository,
        backup_dir = %config.backup_dir,
        "starting xmind backup"
    );

    let provider = XmindClient::with_base_url(&config.xmind_base_url, headers)
        .context("invalid XMind client configuration")?;
    let store = GithubClient::with_base_url(
        &config.github_api_url,
        config.github_token.clone(),
        &config.repository,
    )
    .context("invalid GitHub client configuration")?
    .with_branch(config.branch.clone());
    let reconciler = Reconciler::new(store).with_skip_unchanged(config.skip_unchanged);
    let options = EngineOptions {
        listing: ListFolderRequest::new(config.folder_id.clone())
            .with_team(config.team_id.clone())
            .with_limit(config.page_size),
        backup_dir: config.backup_dir.clone(),
        item_delay: config.item_delay,
    };

    let summary = BackupEngine::new(provider, reconciler, options).run().await?;
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "some files were not backed up");
    }
    Ok(())
}
