use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::Result;

use eddy::bot::Bot;
use eddy::config::Config;
use eddy::detect::Detector;
use eddy::manager::GraphManager;
use eddy::telemetry::AtomicTelemetry;
use eddy::utils::logger::setup_logger;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// [DEBUG] Validate the live graph invariants and print stats
    Validate,
    /// [DEBUG] Run a single detection pass over the current graph
    DetectOnce,
    /// Start the pipeline
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_logger().expect("Failed to set up logger");

    let config = Config::from_env();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Validate) => {
            validate(&config).await?;
        }
        Some(Commands::DetectOnce) => {
            detect_once(&config).await;
        }
        Some(Commands::Start) => {
            start(config).await?;
        }
        None => {
            log::error!("No command provided");
        }
    }

    Ok(())
}

async fn start(config: Config) -> Result<()> {
    let telemetry = Arc::new(AtomicTelemetry::new());
    let mut bot = Bot::new(&config, telemetry.clone())?;

    let mut opportunities = bot
        .take_opportunities()
        .ok_or_else(|| eyre::eyre!("Opportunity feed already taken"))?;
    bot.start();

    // The ingest collaborators attach here: they get `bot.update_sender()`
    // and push decoded ReserveUpdate / PoolAdded records
    log::info!(
        "Pipeline up: {} start tokens, {} workers, min factor {}",
        config.start_tokens.len(),
        config.num_workers,
        config.min_profit_factor
    );

    let logger = tokio::spawn(async move {
        while let Some(opportunity) = opportunities.recv().await {
            log::info!("Opportunity: {opportunity}");
            // Structured form for downstream scrapers
            if let Ok(json) = serde_json::to_string(&opportunity) {
                log::debug!("{json}");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    bot.shutdown().await;
    logger.abort();

    log::info!(
        "Totals: {} updates, {} snapshots, {} cycles, {} opportunities, {} drops",
        telemetry.updates_received.load(Ordering::Relaxed),
        telemetry.snapshots_built.load(Ordering::Relaxed),
        telemetry.cycles_found.load(Ordering::Relaxed),
        telemetry.opportunities_emitted.load(Ordering::Relaxed),
        telemetry.channel_drops.load(Ordering::Relaxed),
    );
    Ok(())
}

async fn detect_once(config: &Config) {
    let telemetry = Arc::new(AtomicTelemetry::new());
    let (manager, _snapshots) = GraphManager::new(config, telemetry.clone());
    let (detector, _opportunities) = Detector::new(config, telemetry);

    let snapshot = manager.current_snapshot(0).await;
    let opportunities = detector.detect_once(&snapshot);
    log::info!(
        "Scanned block {}: {} tokens, {} pools, {} opportunities",
        snapshot.block(),
        snapshot.node_count(),
        snapshot.pool_count(),
        opportunities.len()
    );
    for opportunity in &opportunities {
        log::info!("Opportunity: {opportunity}");
    }
}

async fn validate(config: &Config) -> Result<()> {
    let telemetry = Arc::new(AtomicTelemetry::new());
    let (manager, _snapshots) = GraphManager::new(config, telemetry);

    let report = manager.validate().await;
    let (nodes, edges, pools) = manager.stats().await;
    log::info!("Graph: {nodes} tokens, {edges} edges, {pools} pools");
    for warning in &report.warnings {
        log::warn!("{warning}");
    }
    for error in &report.errors {
        log::error!("{error}");
    }

    if report.is_ok() {
        log::info!("Graph invariants hold");
        Ok(())
    } else {
        eyre::bail!("{} invariant violations", report.errors.len())
    }
}
