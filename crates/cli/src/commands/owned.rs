//! Owned-apps command.

use keyporter_exporter::{Config, FileStore, OwnedAppsCache, SteamClient, SteamError};
use thiserror::Error;

/// Errors that can occur while loading owned apps.
#[derive(Debug, Error)]
pub enum OwnedError {
    /// Record store file could not be read.
    #[error("Store error: {0}")]
    Store(#[from] std::io::Error),

    /// Steam client could not be built.
    #[error("Steam error: {0}")]
    Steam(#[from] SteamError),
}

/// Load and print the owned Steam ids.
#[allow(clippy::print_stdout)]
pub async fn run(config: &Config, refresh: bool) -> Result<(), OwnedError> {
    let mut store = FileStore::open(&config.store_path)?;
    let steam = SteamClient::new(config)?;
    let mut cache = OwnedAppsCache::new();

    let owned = cache.load_owned(&steam, &mut store, refresh).await;
    println!("{} owned ids", owned.len());
    for id in owned {
        println!("{id}");
    }
    Ok(())
}
