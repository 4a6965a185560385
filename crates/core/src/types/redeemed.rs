//! Result record for one choice-bundle claim attempt.

use serde::{Deserialize, Serialize};

/// Outcome of claiming one entitlement inside a choice bundle.
///
/// Every attempted entitlement produces exactly one record: a success carries
/// the redeemed value, a failure carries an empty value and an error label
/// (`Expired`, `Sold out`, or the underlying failure message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemedChoiceKey {
    pub game_name: String,
    pub machine_name: String,
    pub key_type: String,
    /// Redeemed key or gift link; empty on failure.
    pub key: String,
    /// Human name of the parent choice bundle.
    pub choice_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RedeemedChoiceKey {
    /// True when the claim produced a usable key.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_error_field_omitted_on_success() {
        let record = RedeemedChoiceKey {
            game_name: "Example Game".to_string(),
            machine_name: "example_game".to_string(),
            key_type: "steam".to_string(),
            key: "AAAAA-BBBBB-CCCCC".to_string(),
            choice_title: "March 2024".to_string(),
            error: None,
        };
        assert!(record.is_success());

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_failure_record() {
        let record = RedeemedChoiceKey {
            game_name: "Example Game".to_string(),
            machine_name: "example_game".to_string(),
            key_type: "steam".to_string(),
            key: String::new(),
            choice_title: "March 2024".to_string(),
            error: Some("Sold out".to_string()),
        };
        assert!(!record.is_success());
        assert!(record.key.is_empty());
    }
}
