use anyhow::Result;
use clap::Parser;
use slingshot::logging::{init_logging, LogOptions};
use slingshot::{HubOrchestrator, SlingshotConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "slingshot")]
#[command(about = "Ingestion hub for throw-gesture shot walls")]
#[command(version)]
#[command(long_about = "Accepts shots from phone senders over a websocket, stores their selfies \
with an object storage to local disk fallback, persists a record per shot and broadcasts each \
one to every connected display.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "slingshot.toml", help = "Path to TOML configuration file")]
    config: String,

    #[command(flatten)]
    log: LogOptions,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the hub")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start the server
    #[arg(long, help = "Perform dry run - initialize components but don't bind the server")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args.log)?;

    info!("Starting Slingshot hub v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match SlingshotConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut orchestrator = HubOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize hub: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start hub: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Hub error during execution: {}", e);
        e
    })?;

    info!("Slingshot hub exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Slingshot Configuration File");
    println!("# Every option with its default value. Environment variables override");
    println!("# these, e.g. SLINGSHOT_SERVER__PORT=4000.");
    println!();
    println!("{}", toml::to_string_pretty(&SlingshotConfig::default())?);
    Ok(())
}
