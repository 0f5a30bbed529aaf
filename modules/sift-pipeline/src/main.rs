use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use apify_client::ApifyClient;
use sift_common::file_config::{load_config, SourceConfig};
use sift_common::{AppConfig, FileConfig};
use sift_ledger::{DedupLedger, SqliteLedger};
use sift_pipeline::sources::{ApifySource, CandidateSource, CsvExportSource};
use sift_pipeline::uploader::{SupabaseBackend, TokioSleeper};
use sift_pipeline::{FilterEngine, KeywordRuleset, Orchestrator, RetryPolicy, Uploader};
use supabase_client::SupabaseClient;

#[derive(Parser)]
#[command(name = "sift", about = "Filter scraped social content by keyword and upload it once")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "./config/sift.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single pass
    Run {
        /// Read this CSV export instead of the configured source
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run passes periodically until Ctrl-C
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Load and list the keyword ruleset
    Rules,
    /// Inspect the dedup ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

#[derive(Subcommand)]
enum LedgerCommand {
    /// Entry counts per status
    Stats,
    /// One entry as JSON
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let config = load_config(&cli.config)?;
    let base_dir = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    match cli.command {
        Command::Run { input } => {
            let app = AppConfig::from_env()?;
            let (orchestrator, ledger) = build_pipeline(&config, &app, &base_dir).await?;
            let source = build_source(&config, &app, &base_dir, input)?;
            let shutdown = shutdown_on_ctrl_c();

            let result = orchestrator.run_source(source.as_ref(), &shutdown).await;
            ledger.close().await;
            let stats = result?;
            info!("Pass finished. {stats}");
        }
        Command::Watch { interval_secs } => {
            let app = AppConfig::from_env()?;
            let (orchestrator, ledger) = build_pipeline(&config, &app, &base_dir).await?;
            let source = build_source(&config, &app, &base_dir, None)?;
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(config.pipeline.interval_secs));
            let shutdown = shutdown_on_ctrl_c();

            let result = orchestrator.watch(source.as_ref(), interval, &shutdown).await;
            ledger.close().await;
            if let Err(e) = result {
                error!("Watch aborted: {e}");
                return Err(e.into());
            }
        }
        Command::Rules => {
            let ruleset = KeywordRuleset::load(&config.keywords, &base_dir)?;
            for rule in ruleset.rules() {
                println!(
                    "{} ({} keywords): {}",
                    rule.name(),
                    rule.keywords().len(),
                    rule.keywords().join(", ")
                );
            }
        }
        Command::Ledger { command } => {
            let ledger = open_ledger(&config, &base_dir).await?;
            let result = match command {
                LedgerCommand::Stats => ledger.summary().await.map(|s| println!("{s}")),
                LedgerCommand::Show { id } => ledger.entry(&id).await.map(|entry| match entry {
                    Some(entry) => match serde_json::to_string_pretty(&entry) {
                        Ok(json) => println!("{json}"),
                        Err(e) => warn!(error = %e, "Failed to render entry"),
                    },
                    None => println!("No ledger entry for {id}"),
                }),
            };
            ledger.close().await;
            result?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("sift=info".parse()?)
        .add_directive("apify_client=info".parse()?)
        .add_directive("supabase_client=info".parse()?);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Cancelled on Ctrl-C. Records already started run to completion.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, finishing in-flight records");
            trigger.cancel();
        }
    });
    token
}

async fn open_ledger(config: &FileConfig, base_dir: &Path) -> Result<Arc<SqliteLedger>> {
    let path = base_dir.join(&config.ledger.path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create ledger directory: {}", parent.display()))?;
    }
    let ledger = SqliteLedger::open(&path)
        .await
        .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    Ok(Arc::new(ledger))
}

async fn build_pipeline(
    config: &FileConfig,
    app: &AppConfig,
    base_dir: &Path,
) -> Result<(Orchestrator, Arc<SqliteLedger>)> {
    let ruleset = KeywordRuleset::load(&config.keywords, base_dir)?;
    let ledger = open_ledger(config, base_dir).await?;

    let client = SupabaseClient::new(
        &app.supabase_url,
        app.supabase_service_key.clone(),
        Duration::from_secs(config.upload.timeout_secs),
    )?;
    let uploader = Uploader::new(
        Arc::new(SupabaseBackend::new(client, &config.upload)),
        Arc::new(TokioSleeper),
        RetryPolicy::from(&config.upload),
    );

    let orchestrator = Orchestrator::new(
        FilterEngine::new(Arc::new(ruleset)),
        ledger.clone(),
        uploader,
        config.pipeline.concurrency,
    );
    Ok((orchestrator, ledger))
}

fn build_source(
    config: &FileConfig,
    app: &AppConfig,
    base_dir: &Path,
    input: Option<PathBuf>,
) -> Result<Box<dyn CandidateSource>> {
    if let Some(path) = input {
        return Ok(Box::new(CsvExportSource::new(path)));
    }

    match &config.source {
        SourceConfig::Csv { path } => Ok(Box::new(CsvExportSource::new(base_dir.join(path)))),
        SourceConfig::Apify {
            hashtags,
            profiles,
            limit,
        } => {
            let token = app
                .apify_api_key
                .clone()
                .context("APIFY_API_KEY is required for the apify source")?;
            Ok(Box::new(ApifySource::new(
                ApifyClient::new(token),
                hashtags.clone(),
                profiles.clone(),
                *limit,
            )))
        }
    }
}
