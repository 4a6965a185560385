//! Owned Steam catalog lookup with a storage-backed cache.
//!
//! Ownership display needs the user's owned package and app ids. The list
//! comes from Steam's dynamicstore userdata endpoint, is cached in memory
//! for the life of the session, and is persisted compressed into the record
//! store so later runs skip the network entirely. The persisted entry has no
//! expiry; it is replaced only by clearing it externally.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::store::{KvStore, codec};

/// Storage key for the persisted owned-apps list.
pub const OWNED_APPS_KEY: &str = "keyporter-ownedApps";

/// Errors from the owned-apps fetch.
#[derive(Debug, Error)]
pub enum SteamError {
    /// HTTP request failed (includes timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint returned a non-success status.
    #[error("Steam returned status {0}")]
    Status(u16),
}

/// Source of the user's owned Steam ids.
pub trait OwnedAppsSource {
    /// Fetch the owned package and app ids, unioned into one list.
    fn fetch_owned_apps(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<u32>, SteamError>> + Send;
}

/// Client for Steam's dynamicstore userdata endpoint.
#[derive(Debug, Clone)]
pub struct SteamClient {
    client: reqwest::Client,
    url: String,
}

/// Relevant subset of the userdata response.
#[derive(Debug, Default, Deserialize)]
struct UserData {
    #[serde(rename = "rgOwnedPackages", default)]
    owned_packages: Vec<u32>,
    #[serde(rename = "rgOwnedApps", default)]
    owned_apps: Vec<u32>,
}

impl SteamClient {
    /// Create a client with the configured endpoint and bounded timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &Config) -> Result<Self, SteamError> {
        let client = reqwest::Client::builder()
            .timeout(config.steam_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.steam_userdata_url.clone(),
        })
    }
}

impl OwnedAppsSource for SteamClient {
    #[instrument(skip(self))]
    async fn fetch_owned_apps(&self) -> Result<Vec<u32>, SteamError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SteamError::Status(status.as_u16()));
        }

        let data: UserData = response.json().await?;
        let mut owned = data.owned_packages;
        owned.extend(data.owned_apps);
        Ok(owned)
    }
}

/// Session-scoped owned-apps cache over an [`OwnedAppsSource`].
#[derive(Debug, Default)]
pub struct OwnedAppsCache {
    apps: Option<Vec<u32>>,
}

impl OwnedAppsCache {
    #[must_use]
    pub const fn new() -> Self {
        Self { apps: None }
    }

    /// Load the owned-ids list.
    ///
    /// Resolution order: in-memory cache (skipped when `force_refresh`),
    /// then the persisted store entry, then the remote source. The persisted
    /// entry wins even on a forced refresh; forcing only bypasses the
    /// in-memory copy. Any fetch failure degrades to an empty list and is
    /// never propagated.
    pub async fn load_owned<S: OwnedAppsSource>(
        &mut self,
        source: &S,
        store: &mut dyn KvStore,
        force_refresh: bool,
    ) -> Vec<u32> {
        if !force_refresh
            && let Some(apps) = self.apps.as_ref().filter(|apps| !apps.is_empty())
        {
            debug!("Using cached owned apps");
            return apps.clone();
        }

        if let Some(stored) = store.get(OWNED_APPS_KEY)
            && let Some(json) = codec::decompress(&stored)
            && let Ok(apps) = serde_json::from_str::<Vec<u32>>(&json)
        {
            debug!(count = apps.len(), "Using persisted owned apps");
            return apps;
        }

        debug!("Fetching owned apps from Steam");
        let apps = match source.fetch_owned_apps().await {
            Ok(apps) => apps,
            Err(e) => {
                warn!(error = %e, "Owned apps fetch failed, continuing without ownership data");
                return Vec::new();
            }
        };

        self.apps = Some(apps.clone());
        if let Ok(json) = serde_json::to_string(&apps) {
            store.set(OWNED_APPS_KEY, codec::compress(&json));
        }
        apps
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::MemoryStore;

    struct FakeSource {
        result: Result<Vec<u32>, u16>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn ok(apps: Vec<u32>) -> Self {
            Self {
                result: Ok(apps),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(500),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl OwnedAppsSource for FakeSource {
        async fn fetch_owned_apps(&self) -> Result<Vec<u32>, SteamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(SteamError::Status)
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_empty_list() {
        let source = FakeSource::failing();
        let mut store = MemoryStore::new();
        let mut cache = OwnedAppsCache::new();

        let owned = cache.load_owned(&source, &mut store, false).await;
        assert!(owned.is_empty());
        // Nothing persisted on failure
        assert!(store.get(OWNED_APPS_KEY).is_none());
    }

    #[tokio::test]
    async fn test_success_persists_and_memoizes() {
        let source = FakeSource::ok(vec![440, 570]);
        let mut store = MemoryStore::new();
        let mut cache = OwnedAppsCache::new();

        let owned = cache.load_owned(&source, &mut store, false).await;
        assert_eq!(owned, vec![440, 570]);
        assert!(store.get(OWNED_APPS_KEY).is_some());

        // Second call is served from memory
        let owned = cache.load_owned(&source, &mut store, false).await;
        assert_eq!(owned, vec![440, 570]);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_persisted_entry_wins_even_on_forced_refresh() {
        let source = FakeSource::ok(vec![999]);
        let mut store = MemoryStore::new();
        store.set(OWNED_APPS_KEY, codec::compress("[440]"));
        let mut cache = OwnedAppsCache::new();

        let owned = cache.load_owned(&source, &mut store, true).await;
        assert_eq!(owned, vec![440]);
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_persisted_entry_falls_back_to_fetch() {
        let source = FakeSource::ok(vec![730]);
        let mut store = MemoryStore::new();
        store.set(OWNED_APPS_KEY, "garbage".to_string());
        let mut cache = OwnedAppsCache::new();

        let owned = cache.load_owned(&source, &mut store, false).await;
        assert_eq!(owned, vec![730]);
        assert_eq!(source.call_count(), 1);
    }
}
