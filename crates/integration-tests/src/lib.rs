//! Integration tests for Keyporter.
//!
//! # Running Tests
//!
//! ```bash
//! # Offline pipeline tests (in-memory store, scripted storefront)
//! cargo test -p keyporter-integration-tests
//!
//! # Live tests against the real storefront (needs HUMBLE_SESSION_COOKIE)
//! cargo test -p keyporter-integration-tests -- --ignored
//! ```
//!
//! The fixtures here stand in for the two external systems the pipeline
//! talks to: [`ScriptedApi`] plays the storefront with canned choice pages
//! and scripted redemption outcomes, and [`seeded_store`] builds a record
//! store holding compressed order records exactly as the browser extension
//! persists them.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use keyporter_exporter::humble::types::ChoicePageData;
use keyporter_exporter::store::encode_order;
use keyporter_exporter::{HumbleApi, HumbleError, KvStore, MemoryStore, Order};

/// Scripted storefront double recording every call it receives.
#[derive(Default)]
pub struct ScriptedApi {
    pages: HashMap<String, ChoicePageData>,
    failing_keys: HashSet<String>,
    selection_calls: Mutex<Vec<Vec<String>>>,
    redeem_calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` for `choice_url`.
    #[must_use]
    pub fn with_page(mut self, choice_url: &str, page: ChoicePageData) -> Self {
        self.pages.insert(choice_url.to_string(), page);
        self
    }

    /// Make redemption of `machine_name` fail permanently.
    #[must_use]
    pub fn with_failing_key(mut self, machine_name: &str) -> Self {
        self.failing_keys.insert(machine_name.to_string());
        self
    }

    /// Identifier lists submitted to the selection endpoint, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn selection_calls(&self) -> Vec<Vec<String>> {
        self.selection_calls.lock().unwrap().clone()
    }

    /// Key types submitted to the redemption endpoint, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn redeem_calls(&self) -> Vec<String> {
        self.redeem_calls.lock().unwrap().clone()
    }
}

impl HumbleApi for ScriptedApi {
    async fn fetch_choice_page(&self, choice_url: &str) -> Result<ChoicePageData, HumbleError> {
        self.pages
            .get(choice_url)
            .cloned()
            .ok_or_else(|| HumbleError::Status { status: 404 })
    }

    #[allow(clippy::unwrap_used)]
    async fn choose_content(
        &self,
        _gamekey: &str,
        _parent_identifier: &str,
        identifiers: &[String],
    ) -> Result<(), HumbleError> {
        self.selection_calls
            .lock()
            .unwrap()
            .push(identifiers.to_vec());
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    async fn redeem_key(
        &self,
        keytype: &str,
        _gamekey: &str,
        _keyindex: u32,
        _gift: bool,
    ) -> Result<String, HumbleError> {
        self.redeem_calls.lock().unwrap().push(keytype.to_string());
        if self.failing_keys.contains(keytype) {
            return Err(HumbleError::Redeem {
                message: "No keys available".to_string(),
                permanent: true,
            });
        }
        Ok(format!("KEY-{keytype}"))
    }
}

/// Build a record store seeded with `orders` in their persisted form.
///
/// # Panics
///
/// Panics if an order fails to serialize.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn seeded_store(orders: &[Order]) -> MemoryStore {
    let mut store = MemoryStore::new();
    for order in orders {
        store.set(
            &format!("v2|{}", order.gamekey),
            encode_order(order).unwrap(),
        );
    }
    store
}
