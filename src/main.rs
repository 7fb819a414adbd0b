//! Pack Distribution Service (custodial)
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI / API ──→ app ──→ domain::resolution ──→ store (Distribution, Packs)
//!
//!   poller (ticker)
//!     ├─→ contract ──┬─→ store (Settlement, Minting, CirculatingPackContract)
//!     │              ├─→ outbox rows (settle, mint, reveal, open, state)
//!     │              └─→ chain gateway (events by height window)
//!     └─→ outbox ────────→ chain gateway (signed transactions, results)
//!
//!   cross-cutting: config · observability · lifecycle · resilience
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use pds_custodian::chain::Address;
use pds_custodian::config::{load_config, parse_config};
use pds_custodian::lifecycle::signals::wait_for_signal;
use pds_custodian::observability::{logging, metrics};
use pds_custodian::{app, CreateDistributionRequest, ServiceConfig, Shutdown};

#[derive(Parser)]
#[command(name = "pds-custodian")]
#[command(about = "Custodial pack distribution service")]
#[command(long_about = "Custodial pack distribution service.\n\n\
The store snapshot is owned by one process at a time. Stop `run` before using \
the other commands against the same snapshot.")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller until SIGINT or SIGTERM
    Run,
    /// Create a distribution from a JSON request file
    Create { file: PathBuf },
    /// List distributions
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one distribution with its progress
    Show { id: Uuid },
    /// Abort a distribution and mark it invalid on chain
    Abort { id: Uuid },
    /// Cancel a distribution whose settlement has not started
    Cancel { id: Uuid },
    /// Share the distribution capability with an issuer account
    SetCap { issuer: Address },
    /// Validate the configuration and exit
    CheckConfig,
}

fn load(path: &Path) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(load_config(path)?)
    } else {
        eprintln!("config file {} not found, using defaults", path.display());
        Ok(parse_config("")?)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli.config)?;

    if let Commands::CheckConfig = cli.command {
        println!("configuration OK");
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        chain_enabled = config.chain.enabled,
        access_api_url = %config.chain.access_api_url,
        "pds-custodian starting"
    );

    let services = app::build(&config)?;

    match cli.command {
        Commands::Run => {
            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse() {
                    Ok(addr) => metrics::init_metrics(addr),
                    Err(_) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let shutdown = Shutdown::new();
            tokio::spawn(wait_for_signal(shutdown.clone()));

            if config.poller.enabled {
                services.poller.run(shutdown).await;
            } else {
                tracing::warn!("Poller disabled, waiting for shutdown signal");
                let _ = shutdown.subscribe().recv().await;
            }
            tracing::info!("Shutdown complete");
        }
        Commands::Create { file } => {
            let request: CreateDistributionRequest = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            let id = services.app.create_distribution(request).await?;
            println!("{}", id);
        }
        Commands::List { offset, limit } => {
            print_json(&services.app.list_distributions(offset, limit).await?)?;
        }
        Commands::Show { id } => {
            print_json(&services.app.get_distribution(id).await?)?;
        }
        Commands::Abort { id } => {
            services.app.abort_distribution(id).await?;
            println!("distribution {} aborted", id);
        }
        Commands::Cancel { id } => {
            services.app.cancel_distribution(id).await?;
            println!("distribution {} cancelled", id);
        }
        Commands::SetCap { issuer } => {
            services.app.set_distribution_capability(issuer).await?;
            println!("distribution capability shared with {}", issuer);
        }
        Commands::CheckConfig => {}
    }

    Ok(())
}
