//! Canonical product model.
//!
//! A [`Product`] is one claimable entitlement flattened out of a raw
//! storefront order. Construction happens in the exporter crate; once built
//! the value is treated as immutable.

use serde::{Deserialize, Serialize};

/// Order category a product belongs to.
///
/// Maps the storefront's raw category tags; anything unrecognized is
/// [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    Store,
    Bundle,
    #[default]
    Other,
    Choice,
}

impl Category {
    /// Map a raw order category tag to its canonical category.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "storefront" => Self::Store,
            "bundle" => Self::Bundle,
            "subscriptioncontent" => Self::Choice,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => write!(f, "Store"),
            Self::Bundle => write!(f, "Bundle"),
            Self::Other => write!(f, "Other"),
            Self::Choice => write!(f, "Choice"),
        }
    }
}

/// How an entitlement is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClaimType {
    Key,
    Gift,
    #[default]
    #[serde(rename = "-")]
    None,
}

impl std::fmt::Display for ClaimType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key => write!(f, "Key"),
            Self::Gift => write!(f, "Gift"),
            Self::None => write!(f, "-"),
        }
    }
}

/// Whether the matching Steam app is already owned.
///
/// [`Owned::Unknown`] means the entitlement carries no Steam app id, so
/// ownership cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Owned {
    Yes,
    No,
    #[default]
    #[serde(rename = "-")]
    Unknown,
}

impl std::fmt::Display for Owned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "Yes"),
            Self::No => write!(f, "No"),
            Self::Unknown => write!(f, "-"),
        }
    }
}

/// One claimable entitlement in canonical form.
///
/// Missing upstream fields degrade to sentinel placeholders (`"-"` or an
/// empty string) rather than failing normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub machine_name: String,
    pub category: Category,
    /// Opaque key of the owning order (gamekey).
    pub category_id: String,
    pub category_human_name: String,
    pub human_name: String,
    pub key_type: String,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    /// Redeemed key or gift value; empty while unclaimed.
    pub redeemed_key_val: String,
    pub is_gift: bool,
    /// True when the source marked the entitlement expired or the resolved
    /// expiry lies in the past. An unresolvable expiry never forces this.
    pub is_expired: bool,
    /// Resolved expiry as a UTC RFC 3339 timestamp, or a bare date when the
    /// source gave no time of day, or empty when unknown.
    pub expiry_date: String,
    pub steam_app_id: Option<u32>,
    pub created: String,
    pub keyindex: u32,
    pub owned: Owned,
}
