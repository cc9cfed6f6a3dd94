use clap::{Parser, Subcommand};
use cross_venue_arbitrage::{
    config::ArbitrageConfig,
    trading::{EngineRunner, PaperExecutor, SignerSet, SimulatedFeed},
    utils::logger,
    Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "arbitrage")]
#[command(about = "Cross-venue perpetual futures arbitrage engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/arbitrage.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log file path
    #[arg(long, default_value = "logs/arbitrage.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full engine loop against simulated feeds and a paper executor
    Paper {
        /// How long to run before shutting down, seconds
        #[arg(long, default_value_t = 120)]
        duration_secs: u64,

        /// Simulated base price
        #[arg(long, default_value_t = 40_000.0)]
        base_price: f64,

        /// Peak simulated cross-venue divergence
        #[arg(long, default_value_t = 120.0)]
        divergence: f64,
    },
    /// Validate configuration
    Validate,
    /// Load venue key material and run the signing self-checks
    CheckKeys,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    logger::init(&cli.log_level, &cli.log_file)?;

    info!(
        "Starting {} v{}",
        cross_venue_arbitrage::APP_NAME,
        cross_venue_arbitrage::VERSION
    );

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Paper {
            duration_secs,
            base_price,
            divergence,
        } => run_paper(config, duration_secs, base_price, divergence).await,
        Commands::Validate => validate_config(config).await,
        Commands::CheckKeys => check_keys(config).await,
    }
}

fn load_config(path: &PathBuf) -> Result<ArbitrageConfig> {
    if path.exists() {
        let config = ArbitrageConfig::from_file(path)?;
        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    } else {
        info!(
            "No config file at {}; using built-in defaults",
            path.display()
        );
        Ok(ArbitrageConfig::default())
    }
}

async fn run_paper(
    config: ArbitrageConfig,
    duration_secs: u64,
    base_price: f64,
    divergence: f64,
) -> Result<()> {
    config.validate()?;
    info!(duration_secs, base_price, divergence, "starting paper mode");

    let executor = Arc::new(PaperExecutor::from_config(&config.execution));
    let mut runner = EngineRunner::new(&config, executor.clone())?;
    let feed = SimulatedFeed::new(base_price, 250, divergence);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(duration_secs)) => {
                info!("paper run duration elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
            }
        }
        let _ = shutdown_tx.send(true);
    });

    runner.run(&feed, shutdown_rx).await?;

    let results = executor.results().await;
    let stats = runner.statistics();
    info!("Paper run completed");
    println!("Paper run results:");
    println!("  final state:      {:?}", runner.state());
    println!("  opens/adds/closes: {}/{}/{}", stats.opens, stats.adds, stats.closes);
    println!("  rejections/timeouts: {}/{}", stats.rejections, stats.timeouts);
    println!("  realized pnl:     {:.2}", stats.realized_pnl);
    println!("  orders filled:    {}", results.orders);
    println!("  fees paid:        {:.2}", results.fees_paid);
    println!(
        "  residual exposure: edgex {:.6}, paradex {:.6}",
        results.edgex_position, results.paradex_position
    );

    Ok(())
}

async fn validate_config(config: ArbitrageConfig) -> Result<()> {
    info!("Validating configuration...");

    match config.validate() {
        Ok(_) => {
            info!("Configuration is valid");
            println!("Configuration validation passed!");
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

async fn check_keys(config: ArbitrageConfig) -> Result<()> {
    info!("Loading venue key material...");

    let signers = SignerSet::from_config(&config.venues)?;
    println!("Signing self-checks passed:");
    for venue in [
        cross_venue_arbitrage::Venue::Edgex,
        cross_venue_arbitrage::Venue::Paradex,
    ] {
        let signer = signers.for_venue(venue);
        println!("  {}: public key {}", venue, signer.public_key_hex());
    }

    Ok(())
}
