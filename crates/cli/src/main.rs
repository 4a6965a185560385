//! Keyporter CLI - Product export and choice-claim tools.
//!
//! # Usage
//!
//! ```bash
//! # Dump every entitlement as canonical JSON
//! keyporter products
//!
//! # Same, forcing a refresh of the owned-apps list first
//! keyporter products --refresh-owned
//!
//! # Claim everything claimable from choice bundles
//! keyporter claim
//!
//! # Show the cached owned-apps list
//! keyporter owned
//! ```
//!
//! # Commands
//!
//! - `products` - Normalize stored orders into canonical products
//! - `claim` - Run the choice-bundle claim pipeline
//! - `owned` - Load and print the owned Steam ids

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keyporter_exporter::Config;

mod commands;

#[derive(Parser)]
#[command(name = "keyporter")]
#[command(author, version, about = "Humble Bundle entitlement export and claim tools")]
struct Cli {
    /// Record store file (overrides KEYPORTER_STORE_PATH)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize stored orders into canonical products (JSON on stdout)
    Products {
        /// Bypass the in-memory owned-apps cache
        #[arg(long)]
        refresh_owned: bool,
    },
    /// Claim choice-bundle content and redeem keys
    Claim,
    /// Load and print the owned Steam ids
    Owned {
        /// Bypass the in-memory owned-apps cache
        #[arg(long)]
        refresh: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    match cli.command {
        Commands::Products { refresh_owned } => {
            commands::products::run(&config, refresh_owned).await?;
        }
        Commands::Claim => commands::claim::run(&config).await?,
        Commands::Owned { refresh } => commands::owned::run(&config, refresh).await?,
    }
    Ok(())
}
