//! Product export command.
//!
//! Loads every stored order, resolves ownership against the cached Steam
//! catalog, and prints the canonical product list as JSON.

use keyporter_exporter::{
    Config, ExpiryResolver, FileStore, OwnedAppsCache, SteamClient, SteamError, load_orders,
    products,
};
use thiserror::Error;

/// Errors that can occur during product export.
#[derive(Debug, Error)]
pub enum ProductsError {
    /// Record store file could not be read.
    #[error("Store error: {0}")]
    Store(#[from] std::io::Error),

    /// Steam client could not be built.
    #[error("Steam error: {0}")]
    Steam(#[from] SteamError),

    /// Output serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Export canonical products to stdout.
#[allow(clippy::print_stdout)]
pub async fn run(config: &Config, refresh_owned: bool) -> Result<(), ProductsError> {
    let mut store = FileStore::open(&config.store_path)?;
    let orders = load_orders(&store);
    tracing::debug!(count = orders.len(), "Loaded orders");

    let steam = SteamClient::new(config)?;
    let mut cache = OwnedAppsCache::new();
    let owned = cache.load_owned(&steam, &mut store, refresh_owned).await;

    let resolver = ExpiryResolver::new(config.timezone);
    let products = products(&orders, &owned, &resolver);

    println!("{}", serde_json::to_string_pretty(&products)?);
    Ok(())
}
