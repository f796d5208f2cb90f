//! Gera pipeline runner.
//!
//! Loads the seed configuration into a fresh store, runs the requested
//! stages once and prints the run report as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gera_rates::RateSourceRegistry;
use gera_store::Database;
use gera_worker::{DirectionRatesRepository, LogFaultTracker, Pipeline, PipelineReport, Seed, WorkerConfig};

/// Gera rate pipeline CLI
#[derive(Parser, Debug)]
#[command(name = "gera")]
#[command(about = "Fetch external rates and publish currency and direction rates")]
struct Args {
    /// JSON seed with rate sources, payment systems and the mode snapshot
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Print Prometheus counters after the run
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the rate fetchers
    Fetch,
    /// Fetch, then publish currency rates
    CurrencyRates,
    /// Fetch, then publish direction rates
    Directions,
    /// Run every stage
    Run,
}

fn init_logging(config: &WorkerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = WorkerConfig::from_env();
    init_logging(&config);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(command = ?args.command, "Starting Gera");

    let db = Arc::new(Database::new());
    let seed = match &args.seed {
        Some(path) => Seed::from_file(path)?,
        None => Seed::default(),
    };
    let seeded = seed.apply(&db).await?;
    info!(
        sources = seeded.rate_sources,
        payment_systems = seeded.payment_systems_created,
        modes = seeded.modes_created,
        "Seed applied"
    );

    let registry = Arc::new(RateSourceRegistry::load(&db));
    let pipeline = Pipeline::from_config(db.clone(), registry, &config, Arc::new(LogFaultTracker))?;

    let report = match args.command {
        Command::Run => pipeline.run().await?,
        command => {
            let mut report = PipelineReport::default();
            pipeline.fetch(&mut report).await;
            match command {
                Command::CurrencyRates => report.currency_rates = Some(pipeline.publish_currency_rates().await?),
                Command::Directions => report.directions = Some(pipeline.publish_directions().await?),
                _ => {}
            }
            report
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.directions.is_some() {
        let latest = DirectionRatesRepository::new(db).latest_rates();
        println!("{}", serde_json::to_string_pretty(&latest)?);
    }
    if args.metrics {
        print!("{}", pipeline.metrics().to_prometheus());
    }

    info!("Gera run complete");
    Ok(())
}
