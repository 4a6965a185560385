//! Raw orders to canonical products.
//!
//! Pure flattening step: every entitlement in every order becomes one
//! [`Product`]. Normalization never fails; malformed or missing fields
//! degrade to the sentinel placeholders the canonical model documents.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use keyporter_core::{Category, ClaimType, Owned, Product};

use crate::expiry::ExpiryResolver;
use crate::store::Order;

/// Flatten raw orders into canonical products.
///
/// `owned_apps` is the user's owned Steam catalog; ownership is only
/// reported for entitlements that carry a Steam app id.
#[must_use]
pub fn products(orders: &[Order], owned_apps: &[u32], resolver: &ExpiryResolver) -> Vec<Product> {
    let now = Utc::now();
    orders
        .iter()
        .flat_map(|order| {
            let category = Category::from_raw(&order.product.category);
            order.tpkd_dict.all_tpks.iter().map(move |tpk| {
                let expiry = resolver.resolve(
                    tpk.expiry_date.as_deref(),
                    tpk.custom_instructions_html.as_deref(),
                );
                // A stale source flag never wins over a resolved past expiry;
                // an unresolvable expiry never forces expiration
                let is_expired =
                    tpk.is_expired || expiry_instant(&expiry).is_some_and(|t| t < now);

                let redeemed_key_val = tpk
                    .redeemed_key_val
                    .clone()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_default();
                let claim_type = if tpk.is_gift {
                    ClaimType::Gift
                } else if redeemed_key_val.is_empty() {
                    ClaimType::None
                } else {
                    ClaimType::Key
                };

                Product {
                    machine_name: placeholder_if_empty(&tpk.machine_name),
                    category,
                    category_id: order.gamekey.clone(),
                    category_human_name: placeholder_if_empty(&order.product.human_name),
                    human_name: if tpk.human_name.is_empty() {
                        placeholder_if_empty(&tpk.machine_name)
                    } else {
                        tpk.human_name.clone()
                    },
                    key_type: placeholder_if_empty(&tpk.key_type),
                    claim_type,
                    redeemed_key_val,
                    is_gift: tpk.is_gift,
                    is_expired,
                    expiry_date: expiry,
                    steam_app_id: tpk.steam_app_id,
                    created: order.created.clone(),
                    keyindex: tpk.keyindex,
                    owned: tpk.steam_app_id.map_or(Owned::Unknown, |id| {
                        if owned_apps.contains(&id) {
                            Owned::Yes
                        } else {
                            Owned::No
                        }
                    }),
                }
            })
        })
        .collect()
}

fn placeholder_if_empty(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Interpret a resolved expiry as a UTC instant for comparison.
///
/// Bare dates compare as midnight UTC, matching how the raw strings were
/// compared upstream.
fn expiry_instant(expiry: &str) -> Option<DateTime<Utc>> {
    if expiry.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(expiry) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(expiry, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}
