//! `hanserver` binary: feed API, region sweeps and store cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hanserver::cleaner::run_cleaner;
use hanserver::config::StoreBackend;
use hanserver::harvest::run_sweeps;
use hanserver::reporting::sink_from_config;
use hanserver::store::{MemoryStore, SqliteStore};
use hanserver::{ApiServer, FeedService, HanConfig, HarvestOrchestrator, HarvestSource, Store};
use tokio_util::sync::CancellationToken;

/// Geotagged image feed server.
#[derive(Parser)]
#[command(name = "hanserver", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the feed API (default).
    Serve {
        /// Do not run periodic region sweeps.
        #[arg(long)]
        no_collection: bool,
    },

    /// Run region sweeps only.
    Collect,

    /// Run the store cleaner only.
    Clean,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    config.validate().context("invalid configuration")?;

    let _log_guard = hanserver::logging::init_logging(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hanserver starting");

    let store = open_store(&config)?;
    let sink = Some(sink_from_config(&config.reporting)?);
    let sources = han_collectors::build_collectors(&config.sources)?
        .into_iter()
        .map(HarvestSource::new)
        .collect::<Vec<_>>();
    tracing::info!(sources = ?sources.iter().map(HarvestSource::name).collect::<Vec<_>>(), "sources configured");
    let orchestrator = Arc::new(HarvestOrchestrator::new(Arc::clone(&store), sources, sink.clone()));

    let cancel = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();

    let command = cli.command.unwrap_or(Command::Serve { no_collection: false });
    let run_sweeps_too = match &command {
        Command::Serve { no_collection } => !no_collection && config.harvest.collection_enabled,
        Command::Collect => true,
        Command::Clean => false,
    };
    let run_cleaner_too = match &command {
        Command::Clean => true,
        _ => config.cleaner.enabled,
    };

    if run_sweeps_too {
        let (orchestrator, cancel) = (Arc::clone(&orchestrator), cancel.clone());
        tasks.spawn(async move {
            if let Err(e) = run_sweeps(orchestrator, cancel).await {
                tracing::error!(error = %e, "sweeps failed");
            }
        });
    }
    if run_cleaner_too {
        tasks.spawn(run_cleaner(Arc::clone(&store), config.cleaner.clone(), cancel.clone()));
    }

    let server = match command {
        Command::Serve { .. } => {
            let service = FeedService::new(
                Arc::clone(&orchestrator),
                sink,
                config.feed.sample_size,
                config.feed.background_harvest,
            )?;
            Some(ApiServer::start(Arc::new(service), &config.server).await?)
        }
        Command::Collect | Command::Clean => None,
    };

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    if let Some(server) = &server {
        server.shutdown();
    }
    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }
    orchestrator.drain().await;

    tracing::info!("hanserver shut down cleanly");
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HanConfig> {
    if let Some(path) = path {
        return HanConfig::from_file(path).with_context(|| format!("loading {}", path.display()));
    }
    let default_path = HanConfig::default_config_path();
    if default_path.exists() {
        return HanConfig::from_file(&default_path).with_context(|| format!("loading {}", default_path.display()));
    }
    Ok(HanConfig::default())
}

fn open_store(config: &HanConfig) -> anyhow::Result<Arc<dyn Store>> {
    Ok(match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::open(&config.store.path)
                .with_context(|| format!("opening store at {}", config.store.path.display()))?,
        ),
    })
}
