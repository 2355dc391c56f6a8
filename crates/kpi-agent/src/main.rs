use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kpi_agent::{CycleScheduler, Pipeline};
use kpi_config::{AgentConfig, ConfigLoader};
use kpi_logging::init_logging;
use kpi_notify::RecordingSink;
use kpi_timeseries::{KpiStore, QuestStore};
use kpi_types::NodeType;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single collection cycle for one node type
    Run {
        /// Node type: MME, PGW or SBG
        #[arg(long = "type")]
        node_type: NodeType,

        /// Collect for real but keep samples in memory and print alerts instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run cycles on the configured cron schedules until interrupted
    Serve,

    /// Create the time-series tables
    InitStore,

    /// Validate the configuration and print it with secrets redacted
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new(&args.config)
        .load()
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    init_logging(&config.logging)?;
    info!(config = %args.config.display(), "Starting KPI agent");

    match args.command {
        Command::Run { node_type, dry_run } => run_once(config, node_type, dry_run).await,
        Command::Serve => serve(config).await,
        Command::InitStore => init_store(config).await,
        Command::Check => check(&config),
    }
}

async fn run_once(config: AgentConfig, node_type: NodeType, dry_run: bool) -> Result<()> {
    let sink = RecordingSink::new();
    let pipeline = if dry_run {
        Pipeline::dry_run(config, sink.clone())
    } else {
        Pipeline::connect(config).await?
    };

    if let Some(report) = pipeline.run_cycle(node_type).await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    for payload in sink.sent().await {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

async fn serve(config: AgentConfig) -> Result<()> {
    let pipeline = Arc::new(Pipeline::connect(config).await?);

    let mut scheduler = CycleScheduler::new(pipeline).await?;
    let jobs = scheduler.register_all().await?;
    scheduler.start().await?;
    info!(jobs, "Serving, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    scheduler.shutdown().await
}

async fn init_store(config: AgentConfig) -> Result<()> {
    let store = QuestStore::connect(config.store.clone()).await?;
    store.ensure_tables().await?;
    for node_type in NodeType::ALL {
        println!("{}", config.store.table_for(node_type)?);
    }
    Ok(())
}

fn check(config: &AgentConfig) -> Result<()> {
    println!("{}", config.redacted()?);
    for node_type in NodeType::ALL {
        println!(
            "# {}: {} nodes, {} thresholds",
            node_type,
            config.nodes_of(node_type).len(),
            config.thresholds_of(node_type).len()
        );
    }
    Ok(())
}
