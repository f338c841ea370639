//! Basin selector command line
//!
//! Walks the river → stretch → drain → catchment hierarchy headlessly,
//! printing each level's candidates, and optionally selects every village
//! and confirms.
//!
//! # Usage
//!
//! ```bash
//! # Offline, against a catalog file
//! basin-selector walk --catalog config/sample_catalog.json \
//!     --river R1 --stretch S7 --drain D3 --select-all --confirm
//!
//! # Against the catalog service configured in config/selector.yaml
//! BASIN_SELECTOR_CONFIG=config/selector.yaml basin-selector walk --river R1
//! ```

use anyhow::{bail, Context, Result};
use basin_selector::basin_types::{Level, LocationNode};
use basin_selector::{
    HttpCatalog, LocationCatalog, LogReportSink, SelectOutcome, SelectionSession, SelectorConfig,
    StaticCatalog,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default configuration path
const DEFAULT_CONFIG_PATH: &str = "config/selector.yaml";

#[derive(Parser)]
#[command(name = "basin-selector")]
#[command(version = "0.1.0")]
#[command(about = "Cascading basin hierarchy walk and village selection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the hierarchy down to a drain (or catchment)
    Walk {
        /// Catalog JSON file; the configured HTTP catalog is used when absent
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        river: String,

        #[arg(long)]
        stretch: Option<String>,

        #[arg(long)]
        drain: Option<String>,

        #[arg(long)]
        catchment: Option<String>,

        /// Select every village of the resulting universe
        #[arg(long)]
        select_all: bool,

        /// Confirm the selection and print the report as JSON
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "basin_selector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Walk {
            catalog,
            river,
            stretch,
            drain,
            catchment,
            select_all,
            confirm,
        } => {
            let config = load_config()?;
            let catalog: Arc<dyn LocationCatalog> = match catalog {
                Some(path) => {
                    let path = path.to_string_lossy();
                    Arc::new(StaticCatalog::from_file(&path)?)
                }
                None => Arc::new(HttpCatalog::new(config.catalog.clone())?),
            };

            let steps = [
                (Level::River, Some(river)),
                (Level::Stretch, stretch),
                (Level::Drain, drain),
                (Level::Catchment, catchment),
            ];
            cmd_walk(&config, catalog, &steps, select_all, confirm).await
        }
    }
}

fn load_config() -> Result<SelectorConfig> {
    match std::env::var("BASIN_SELECTOR_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading configuration");
            SelectorConfig::from_file(&path).with_context(|| format!("Failed to load {path}"))
        }
        Err(_) if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            SelectorConfig::from_file(DEFAULT_CONFIG_PATH).context("Failed to load default config")
        }
        Err(_) => Ok(SelectorConfig::default()),
    }
}

async fn cmd_walk(
    config: &SelectorConfig,
    catalog: Arc<dyn LocationCatalog>,
    steps: &[(Level, Option<String>)],
    select_all: bool,
    confirm: bool,
) -> Result<()> {
    let (session, _clock) = SelectionSession::from_config(config, catalog, Arc::new(LogReportSink));

    if let SelectOutcome::FetchFailed(message) = session.load_rivers().await {
        bail!("Failed to load rivers: {message}");
    }
    print_level(Level::River, &session.resolver().candidates(Level::River));

    for (level, id) in steps {
        let Some(id) = id else { break };
        match session.select(*level, id.as_str()).await? {
            SelectOutcome::FetchFailed(message) => {
                bail!("Fetch below {level} {id} failed: {message}")
            }
            SelectOutcome::Superseded | SelectOutcome::Frozen => {
                bail!("Selection of {level} {id} did not apply")
            }
            SelectOutcome::Applied | SelectOutcome::Unchanged => {}
        }
        for child in level.downstream() {
            let candidates = session.resolver().candidates(child);
            if !candidates.is_empty() {
                print_level(child, &candidates);
            }
        }
    }

    if select_all {
        let outcome = session.dropdown().select_all();
        if !outcome.is_accepted() {
            bail!("Select-all was not accepted: {outcome:?}");
        }
        println!("selected {} villages", session.store().selection().len());
    }

    if confirm {
        let report = session.confirm()?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn print_level(level: Level, nodes: &[LocationNode]) {
    println!("{level}:");
    for node in nodes {
        println!("  {:<12} {}", node.id().as_str(), node.name());
    }
}
