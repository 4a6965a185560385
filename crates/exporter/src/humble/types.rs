//! Wire types for the choice page's embedded data.
//!
//! Field names mirror the JSON the storefront embeds in its membership
//! pages; unknown fields are ignored and missing optional structure degrades
//! to empty defaults so a partially-populated page still parses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Key-type suffix marking entitlements that need no redemption call.
pub const KEYLESS_SUFFIX: &str = "_keyless";

fn default_parent_identifier() -> String {
    "initial".to_string()
}

/// Embedded data of one choice page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoicePageData {
    /// Identifier the selection endpoint expects alongside chosen items.
    #[serde(rename = "parentIdentifier", default = "default_parent_identifier")]
    pub parent_identifier: String,
    /// True for the modern selection model where items are claimed directly
    /// rather than through monthly choice slots.
    #[serde(rename = "productIsChoiceless", default)]
    pub product_is_choiceless: bool,
    #[serde(rename = "contentChoiceOptions")]
    pub content_choice_options: ContentChoiceOptions,
}

/// Per-bundle claim metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentChoiceOptions {
    #[serde(default)]
    pub gamekey: String,
    #[serde(rename = "canRedeemGames", default)]
    pub can_redeem_games: bool,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "contentChoiceData", default)]
    pub content_choice_data: ContentChoiceData,
    /// Selections already recorded server-side, keyed by selection round.
    #[serde(rename = "contentChoicesMade", default)]
    pub content_choices_made: HashMap<String, ChoicesMade>,
}

/// The addressable items of a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentChoiceData {
    #[serde(default)]
    pub display_order: Vec<String>,
    #[serde(default)]
    pub game_data: HashMap<String, ChoiceGame>,
}

/// One selectable title and its claimable entitlements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceGame {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tpkds: Vec<ChoiceTpk>,
}

/// One claimable entitlement inside a choice item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceTpk {
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub human_name: String,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub sold_out: bool,
    #[serde(default)]
    pub steam_app_id: Option<u32>,
    #[serde(default)]
    pub redeemed_key_val: Option<String>,
}

impl ChoiceTpk {
    /// Keyless entitlements grant ownership implicitly; nothing to redeem.
    #[must_use]
    pub fn is_keyless(&self) -> bool {
        self.key_type.ends_with(KEYLESS_SUFFIX)
    }

    /// The already-redeemed value, if any.
    #[must_use]
    pub fn redeemed_value(&self) -> Option<&str> {
        self.redeemed_key_val.as_deref().filter(|v| !v.is_empty())
    }

    /// True when this entitlement still justifies a selection call.
    #[must_use]
    pub fn needs_selection(&self) -> bool {
        !self.is_keyless() && self.redeemed_value().is_none() && !self.is_expired && !self.sold_out
    }
}

/// Identifiers already selected in one round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoicesMade {
    #[serde(default)]
    pub choices_made: Vec<String>,
}
