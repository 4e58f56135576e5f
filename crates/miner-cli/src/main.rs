//! unity-miner - editor release miner

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use miner_cli::Cli;
use miner_cli::report::{RunReport, render_plain};
use miner_core::coordinator::CoordinatorConfig;
use miner_core::io::download::HttpFetcher;
use miner_core::io::extract::ArchiveExtractor;
use miner_core::jobs::default_jobs;
use miner_core::releases::ReleaseList;
use miner_core::{
    CatalogLoader, Coordinator, ErrorWebhook, LogReporter, Miner, MinerConfig, Reporter,
    TargetCatalog,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config().await?;
    let client = reqwest::Client::builder()
        .user_agent(miner_core::USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let result = run(&cli, &config, client.clone()).await;
    if let Err(e) = &result
        && let Some(url) = &config.error_webhook
    {
        let message = format!("Unexpected error while running the miner: `{e:#}`");
        if let Err(notify_err) = ErrorWebhook::new(client, url).send("Error", &message).await {
            tracing::warn!(error = %notify_err, "failed to post error report");
        }
    }
    result
}

async fn run(cli: &Cli, config: &MinerConfig, client: reqwest::Client) -> Result<()> {
    let only = cli.selected_version()?;

    let releases_path = cli.releases_path()?;
    let releases = ReleaseList::load(&releases_path)
        .await
        .with_context(|| format!("Failed to load releases from {}", releases_path.display()))?
        .select(only.as_ref());
    if let Some(version) = &only
        && releases.is_empty()
    {
        tracing::warn!(%version, "release not found in release list");
    }

    let reporter: Arc<dyn Reporter> = Arc::new(LogReporter);

    let coordinator = Coordinator::new(
        Arc::new(TargetCatalog::new(&config.catalog_base_url)),
        Arc::new(HttpFetcher::new(client.clone(), Arc::clone(&reporter))),
        Arc::new(ArchiveExtractor::new(config.seven_zip.clone())),
        config.download_concurrency,
        reporter,
        CoordinatorConfig {
            retry_delay: config.retry_delay(),
            tmp_dir: config.tmp_dir.clone(),
        },
    );
    let miner = Miner::new(
        Arc::new(CatalogLoader::new(client, &config.catalog_base_url)),
        Arc::new(coordinator),
        default_jobs(&cli.repo),
        config.target_parallelism,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    tracing::info!(
        releases = releases.len(),
        repo = %cli.repo.display(),
        "starting run"
    );
    let summaries = miner.run(releases, &cancel).await;

    if cli.json {
        println!("{}", RunReport::new(&summaries).to_json()?);
    } else {
        print!("{}", render_plain(&summaries));
    }

    // Per-target failures are in the summary; they do not fail the run.
    Ok(())
}
