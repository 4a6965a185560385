//! Choice-claim command.
//!
//! Discovers choice orders in the record store, runs the claim pipeline, and
//! prints one progress line per step followed by the result records as JSON.

use keyporter_exporter::{
    ClaimSession, Config, FileStore, HumbleClient, HumbleError, process_all_choices,
};
use thiserror::Error;

/// Errors that can occur while setting up the claim run.
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Record store file could not be read.
    #[error("Store error: {0}")]
    Store(#[from] std::io::Error),

    /// Storefront client could not be built.
    #[error("Client error: {0}")]
    Client(#[from] HumbleError),

    /// Output serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run the claim pipeline for every discovered choice order.
#[allow(clippy::print_stdout)]
pub async fn run(config: &Config) -> Result<(), ClaimError> {
    let store = FileStore::open(&config.store_path)?;
    let client = HumbleClient::new(config)?;
    let mut session = ClaimSession::new();

    let mut on_progress = |msg: &str| println!("{msg}");
    let results = process_all_choices(&client, &store, &mut session, &mut on_progress).await;

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    println!(
        "Done: {succeeded} redeemed, {} failed",
        results.len() - succeeded
    );
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
