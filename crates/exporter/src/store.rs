//! Record store port and raw order decoding.
//!
//! The storefront extension persists one purchase record per key, prefixed
//! `v2|`, with the value LZ-compressed (lz-string `compressToUTF16`) JSON.
//! This module exposes that storage behind the [`KvStore`] port, decodes
//! records best-effort (a bad record never aborts a scan), and derives the
//! choice orders that need the claim flow.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Key prefix for stored purchase records.
pub const ORDER_KEY_PREFIX: &str = "v2|";

// =============================================================================
// Port
// =============================================================================

/// Key-value storage port.
///
/// Mirrors the browser storage the records originate from: string keys,
/// string values, no transactions.
pub trait KvStore {
    /// All keys currently present, in a stable order.
    fn keys(&self) -> Vec<String>;
    /// Value for `key`, if present.
    fn get(&self, key: &str) -> Option<String>;
    /// Insert or replace `key`.
    fn set(&mut self, key: &str, value: String);
}

/// In-memory store for tests and fakes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

/// File-backed store: one JSON object mapping keys to values.
///
/// This is the CLI's stand-in for exported browser storage. Writes are
/// flushed to disk immediately; a flush failure is logged and the in-memory
/// state kept, matching the best-effort contract of the port.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open a store file, treating a missing file as an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object of strings.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, entries })
    }

    fn flush(&self) {
        let result = serde_json::to_string(&self.entries)
            .map_err(io::Error::other)
            .and_then(|text| std::fs::write(&self.path, text));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to flush store file");
        }
    }
}

impl KvStore for FileStore {
    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
        self.flush();
    }
}

// =============================================================================
// Codec
// =============================================================================

/// lz-string `compressToUTF16`-compatible text codec.
pub mod codec {
    /// Compress text to the UTF-16-safe lz-string form.
    #[must_use]
    pub fn compress(text: &str) -> String {
        lz_str::compress_to_utf16(text)
    }

    /// Reverse [`compress`]; `None` when the input is not valid compressed
    /// text.
    #[must_use]
    pub fn decompress(data: &str) -> Option<String> {
        let wide = lz_str::decompress_from_utf16(data)?;
        String::from_utf16(&wide).ok()
    }
}

// =============================================================================
// Raw record shapes
// =============================================================================

/// One purchase or subscription record as stored by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub created: String,
    /// Opaque key the order is addressed by, upstream and here.
    pub gamekey: String,
    pub product: OrderProduct,
    #[serde(default)]
    pub tpkd_dict: TpkdDict,
}

/// Order-level product metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderProduct {
    /// Raw category tag: storefront, bundle, gamepage, widget, or
    /// subscriptioncontent.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub human_name: String,
    /// Present on subscription orders that have a choice page.
    #[serde(default)]
    pub choice_url: Option<String>,
}

/// Container for an order's entitlements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TpkdDict {
    #[serde(default)]
    pub all_tpks: Vec<Tpk>,
}

/// One claimable entitlement (third-party key) inside an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tpk {
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub human_name: String,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub custom_instructions_html: Option<String>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub is_gift: bool,
    /// Slot index used when addressing the redemption endpoint.
    #[serde(default)]
    pub keyindex: u32,
    #[serde(default)]
    pub redeemed_key_val: Option<String>,
    #[serde(default)]
    pub steam_app_id: Option<u32>,
    #[serde(default)]
    pub sold_out: bool,
    #[serde(default)]
    pub direct_redeem: bool,
    #[serde(default)]
    pub exclusive_countries: Vec<String>,
    #[serde(default)]
    pub disallowed_countries: Vec<String>,
}

/// A subscription order that has a choice page to claim from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOrder {
    pub gamekey: String,
    pub choice_url: String,
    pub human_name: String,
}

// =============================================================================
// Decoding
// =============================================================================

/// Why one stored record could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Value is not valid compressed text.
    #[error("value is not valid compressed text")]
    Codec,
    /// Decompressed text is not a valid order record.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one stored value into an [`Order`].
///
/// # Errors
///
/// Returns [`DecodeError`] when the value fails decompression or JSON
/// decoding. Callers scanning the store are expected to skip such records.
pub fn decode_order(value: &str) -> Result<Order, DecodeError> {
    let json = codec::decompress(value).ok_or(DecodeError::Codec)?;
    Ok(serde_json::from_str(&json)?)
}

/// Encode an [`Order`] into its stored form. Used by tests and fixtures.
///
/// # Errors
///
/// Returns an error if the order fails to serialize.
pub fn encode_order(order: &Order) -> Result<String, serde_json::Error> {
    Ok(codec::compress(&serde_json::to_string(order)?))
}

fn decoded_orders(store: &dyn KvStore) -> impl Iterator<Item = Order> {
    store
        .keys()
        .into_iter()
        .filter(|key| key.starts_with(ORDER_KEY_PREFIX))
        .filter_map(|key| {
            let value = store.get(&key)?;
            match decode_order(&value) {
                Ok(order) => Some(order),
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping undecodable record");
                    None
                }
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
}

/// Load every decodable order that has at least one entitlement.
///
/// Decode failures for individual records are swallowed; one corrupt entry
/// never affects the rest of the scan.
pub fn load_orders(store: &dyn KvStore) -> Vec<Order> {
    decoded_orders(store)
        .filter(|order| !order.tpkd_dict.all_tpks.is_empty())
        .collect()
}

/// Find subscription orders that carry a choice page reference.
pub fn find_choice_orders(store: &dyn KvStore) -> Vec<ChoiceOrder> {
    decoded_orders(store)
        .filter(|order| order.product.category == "subscriptioncontent")
        .filter_map(|order| {
            let choice_url = order.product.choice_url?;
            Some(ChoiceOrder {
                gamekey: order.gamekey,
                choice_url,
                human_name: order.product.human_name,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(gamekey: &str, category: &str, choice_url: Option<&str>, tpks: usize) -> Order {
        Order {
            created: "2024-01-01T00:00:00".to_string(),
            gamekey: gamekey.to_string(),
            product: OrderProduct {
                category: category.to_string(),
                human_name: format!("{gamekey} bundle"),
                choice_url: choice_url.map(String::from),
            },
            tpkd_dict: TpkdDict {
                all_tpks: (0..tpks)
                    .map(|i| Tpk {
                        machine_name: format!("game_{i}"),
                        human_name: format!("Game {i}"),
                        key_type: "steam".to_string(),
                        ..Tpk::default()
                    })
                    .collect(),
            },
        }
    }

    fn store_with(orders: &[Order]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for o in orders {
            store.set(
                &format!("{ORDER_KEY_PREFIX}{}", o.gamekey),
                encode_order(o).unwrap(),
            );
        }
        store
    }

    #[test]
    fn test_codec_round_trip() {
        let text = r#"{"gamekey":"abc","product":{"category":"bundle"}}"#;
        let compressed = codec::compress(text);
        assert_ne!(compressed, text);
        assert_eq!(codec::decompress(&compressed).unwrap(), text);
    }

    #[test]
    fn test_decode_failure_does_not_abort_scan() {
        let mut store = store_with(&[order("good", "bundle", None, 2)]);
        store.set("v2|broken", "not compressed json at all".to_string());

        let orders = load_orders(&store);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders.first().unwrap().gamekey, "good");
    }

    #[test]
    fn test_load_orders_skips_empty_and_unprefixed() {
        let mut store = store_with(&[
            order("with_keys", "storefront", None, 1),
            order("no_keys", "storefront", None, 0),
        ]);
        store.set(
            "unrelated",
            encode_order(&order("other", "bundle", None, 3)).unwrap(),
        );

        let orders = load_orders(&store);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders.first().unwrap().gamekey, "with_keys");
    }

    #[test]
    fn test_find_choice_orders() {
        let store = store_with(&[
            order("choice1", "subscriptioncontent", Some("march-2024"), 0),
            order("nochoiceurl", "subscriptioncontent", None, 1),
            order("plain", "bundle", Some("not-a-subscription"), 1),
        ]);

        let choices = find_choice_orders(&store);
        assert_eq!(
            choices,
            vec![ChoiceOrder {
                gamekey: "choice1".to_string(),
                choice_url: "march-2024".to_string(),
                human_name: "choice1 bundle".to_string(),
            }]
        );
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        assert!(store.keys().is_empty());
        store.set("v2|abc", "value".to_string());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("v2|abc").as_deref(), Some("value"));
    }
}
