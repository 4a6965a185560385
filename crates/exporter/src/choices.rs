//! Choice-bundle claim orchestration.
//!
//! For every subscription order with a choice page this module decides which
//! items still need a selection call, issues at most one such call, then
//! redeems each claimable entitlement one at a time. Every attempted
//! entitlement yields exactly one [`RedeemedChoiceKey`] record; nothing is
//! silently dropped.
//!
//! Remote calls are strictly sequential. The redemption endpoint addresses
//! keys by slot index, and overlapping submissions for the same order could
//! double-claim a slot.

use std::collections::HashSet;

use keyporter_core::{Product, RedeemedChoiceKey};
use tracing::{debug, warn};

use crate::humble::types::{ChoiceGame, ChoiceTpk};
use crate::humble::{HumbleApi, HumbleError};
use crate::store::{self, ChoiceOrder, KvStore};

/// Session-scoped failure memory.
///
/// Remembers items that already failed so a retry within the same session
/// does not hammer the remote endpoint for keys known to be unredeemable.
/// Advisory only: dropping the session forgets everything.
#[derive(Debug, Default)]
pub struct ClaimSession {
    /// Choice items that failed redemption, keyed by `(gamekey, item id)`.
    failed_choice_items: HashSet<(String, String)>,
    /// Permanently-failed general redemptions, keyed by
    /// `(gamekey, machine name)`.
    failed_keys: HashSet<(String, String)>,
}

impl ClaimSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn choice_item_failed(&self, gamekey: &str, item_id: &str) -> bool {
        self.failed_choice_items
            .contains(&(gamekey.to_string(), item_id.to_string()))
    }

    fn record_choice_failure(&mut self, gamekey: &str, item_id: &str) {
        self.failed_choice_items
            .insert((gamekey.to_string(), item_id.to_string()));
    }

    /// True when a general redemption already failed permanently this
    /// session.
    #[must_use]
    pub fn key_permanently_failed(&self, gamekey: &str, machine_name: &str) -> bool {
        self.failed_keys
            .contains(&(gamekey.to_string(), machine_name.to_string()))
    }

    fn record_permanent_key_failure(&mut self, gamekey: &str, machine_name: &str) {
        self.failed_keys
            .insert((gamekey.to_string(), machine_name.to_string()));
    }
}

fn record(
    game: &ChoiceGame,
    tpkd: &ChoiceTpk,
    choice_title: &str,
    key: String,
    error: Option<String>,
) -> RedeemedChoiceKey {
    RedeemedChoiceKey {
        game_name: game.title.clone(),
        machine_name: tpkd.machine_name.clone(),
        key_type: tpkd.key_type.clone(),
        key,
        choice_title: choice_title.to_string(),
        error,
    }
}

/// Process a single choice order: select outstanding items, then redeem
/// their entitlements.
///
/// Bundles outside the modern selection model, and bundles the account
/// cannot redeem from, are skipped with a progress note and produce no
/// records.
///
/// # Errors
///
/// Returns an error when the page fetch, page parse, or selection call
/// fails; individual redemption failures are captured on the output records
/// instead.
pub async fn process_choice<A: HumbleApi>(
    api: &A,
    session: &mut ClaimSession,
    order: &ChoiceOrder,
    on_progress: &mut dyn FnMut(&str),
) -> Result<Vec<RedeemedChoiceKey>, HumbleError> {
    let mut results = Vec::new();

    on_progress(&format!("Fetching: {}", order.human_name));
    let page = api.fetch_choice_page(&order.choice_url).await?;

    if !page.product_is_choiceless {
        on_progress(&format!("Skipping {} (old-style choice)", order.human_name));
        return Ok(results);
    }
    let options = &page.content_choice_options;
    if !options.can_redeem_games {
        on_progress(&format!("Skipping {} (cannot redeem)", order.human_name));
        return Ok(results);
    }

    let gamekey = &options.gamekey;
    let data = &options.content_choice_data;

    // Items already selected server-side, across all selection rounds
    let already_chosen: HashSet<&str> = options
        .content_choices_made
        .values()
        .flat_map(|made| made.choices_made.iter().map(String::as_str))
        .collect();

    // Candidates: items with claimable entitlements, minus ones that
    // already failed for this gamekey this session
    let item_ids: Vec<&str> = data
        .display_order
        .iter()
        .map(String::as_str)
        .filter(|id| data.game_data.get(*id).is_some_and(|g| !g.tpkds.is_empty()))
        .filter(|id| !session.choice_item_failed(gamekey, id))
        .collect();

    // Of those, only unselected items that still hold a redeemable
    // entitlement go to the selection endpoint
    let unchosen: Vec<String> = item_ids
        .iter()
        .filter(|id| !already_chosen.contains(**id))
        .filter(|id| {
            data.game_data
                .get(**id)
                .is_some_and(|g| g.tpkds.iter().any(ChoiceTpk::needs_selection))
        })
        .map(|id| (*id).to_string())
        .collect();

    if !unchosen.is_empty() {
        on_progress(&format!(
            "Choosing {} games for {}",
            unchosen.len(),
            order.human_name
        ));
        api.choose_content(gamekey, &page.parent_identifier, &unchosen)
            .await?;
    }

    for id in item_ids {
        let Some(game) = data.game_data.get(id) else {
            continue;
        };
        for tpkd in &game.tpkds {
            if let Some(existing) = tpkd.redeemed_value() {
                results.push(record(game, tpkd, &options.title, existing.to_string(), None));
                continue;
            }

            if tpkd.is_keyless() {
                continue;
            }

            if tpkd.is_expired || tpkd.sold_out {
                let label = if tpkd.is_expired { "Expired" } else { "Sold out" };
                results.push(record(
                    game,
                    tpkd,
                    &options.title,
                    String::new(),
                    Some(label.to_string()),
                ));
                continue;
            }

            on_progress(&format!("Redeeming: {}", game.title));
            match api.redeem_key(&tpkd.machine_name, gamekey, 0, false).await {
                Ok(key) => {
                    results.push(record(game, tpkd, &options.title, key, None));
                }
                Err(e) => {
                    session.record_choice_failure(gamekey, id);
                    results.push(record(
                        game,
                        tpkd,
                        &options.title,
                        String::new(),
                        Some(e.to_string()),
                    ));
                }
            }
        }
    }

    Ok(results)
}

/// Process every choice order found in the record store.
///
/// A failing order is reported through the progress callback and skipped;
/// results from the remaining orders are concatenated.
pub async fn process_all_choices<A: HumbleApi>(
    api: &A,
    store: &dyn KvStore,
    session: &mut ClaimSession,
    on_progress: &mut dyn FnMut(&str),
) -> Vec<RedeemedChoiceKey> {
    let orders = store::find_choice_orders(store);
    debug!(count = orders.len(), "Found choice orders");

    if orders.is_empty() {
        on_progress("No choice orders found");
        return Vec::new();
    }

    let mut all_results = Vec::new();
    for order in &orders {
        match process_choice(api, session, order, on_progress).await {
            Ok(results) => all_results.extend(results),
            Err(e) => {
                warn!(choice_url = %order.choice_url, error = %e, "Failed to process choice order");
                on_progress(&format!("Error processing {}: {e}", order.human_name));
            }
        }
    }

    all_results
}

/// Redeem one general (non-choice) product, honoring the session's
/// permanent-failure memory.
///
/// # Errors
///
/// Returns the underlying redemption error; permanent failures are recorded
/// so later attempts within the session short-circuit without a remote call.
pub async fn redeem_product<A: HumbleApi>(
    api: &A,
    session: &mut ClaimSession,
    product: &Product,
) -> Result<String, HumbleError> {
    if session.key_permanently_failed(&product.category_id, &product.machine_name) {
        return Err(HumbleError::Redeem {
            message: "failed permanently earlier this session".to_string(),
            permanent: true,
        });
    }

    match api
        .redeem_key(
            &product.machine_name,
            &product.category_id,
            product.keyindex,
            product.is_gift,
        )
        .await
    {
        Ok(value) => Ok(value),
        Err(e) => {
            if matches!(e, HumbleError::Redeem { permanent: true, .. }) {
                session.record_permanent_key_failure(&product.category_id, &product.machine_name);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::humble::types::{
        ChoicePageData, ChoicesMade, ContentChoiceData, ContentChoiceOptions,
    };
    use crate::store::MemoryStore;

    struct FakeApi {
        pages: HashMap<String, ChoicePageData>,
        failing_keys: HashSet<String>,
        selection_calls: Mutex<Vec<Vec<String>>>,
        redeem_calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn with_page(choice_url: &str, page: ChoicePageData) -> Self {
            let mut pages = HashMap::new();
            pages.insert(choice_url.to_string(), page);
            Self {
                pages,
                failing_keys: HashSet::new(),
                selection_calls: Mutex::new(Vec::new()),
                redeem_calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, machine_name: &str) -> Self {
            self.failing_keys.insert(machine_name.to_string());
            self
        }

        fn selection_calls(&self) -> Vec<Vec<String>> {
            self.selection_calls.lock().unwrap().clone()
        }

        fn redeem_calls(&self) -> Vec<String> {
            self.redeem_calls.lock().unwrap().clone()
        }
    }

    impl HumbleApi for FakeApi {
        async fn fetch_choice_page(&self, choice_url: &str) -> Result<ChoicePageData, HumbleError> {
            self.pages
                .get(choice_url)
                .cloned()
                .ok_or_else(|| HumbleError::Status { status: 404 })
        }

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

    fn tpk(machine_name: &str) -> ChoiceTpk {
        ChoiceTpk {
            machine_name: machine_name.to_string(),
            key_type: "steam".to_string(),
            human_name: machine_name.to_string(),
            ..ChoiceTpk::default()
        }
    }

    fn page(items: Vec<(&str, ChoiceGame)>, chosen: &[&str]) -> ChoicePageData {
        let display_order = items.iter().map(|(id, _)| (*id).to_string()).collect();
        let game_data = items
            .into_iter()
            .map(|(id, game)| (id.to_string(), game))
            .collect();
        let mut content_choices_made = HashMap::new();
        if !chosen.is_empty() {
            content_choices_made.insert(
                "initial".to_string(),
                ChoicesMade {
                    choices_made: chosen.iter().map(|id| (*id).to_string()).collect(),
                },
            );
        }
        ChoicePageData {
            parent_identifier: "initial".to_string(),
            product_is_choiceless: true,
            content_choice_options: ContentChoiceOptions {
                gamekey: "gk_choice".to_string(),
                can_redeem_games: true,
                title: "March 2024".to_string(),
                content_choice_data: ContentChoiceData {
                    display_order,
                    game_data,
                },
                content_choices_made,
            },
        }
    }

    fn order() -> ChoiceOrder {
        ChoiceOrder {
            gamekey: "gk_choice".to_string(),
            choice_url: "march-2024".to_string(),
            human_name: "March 2024 Choice".to_string(),
        }
    }

    fn no_progress() -> impl FnMut(&str) {
        |_: &str| {}
    }

    #[tokio::test]
    async fn test_old_style_choice_is_skipped() {
        let mut old_style = page(vec![("alpha", ChoiceGame {
            title: "Alpha".to_string(),
            tpkds: vec![tpk("alpha_steam")],
        })], &[]);
        old_style.product_is_choiceless = false;
        let api = FakeApi::with_page("march-2024", old_style);
        let mut session = ClaimSession::new();

        let mut messages = Vec::new();
        let results = process_choice(&api, &mut session, &order(), &mut |m| {
            messages.push(m.to_string());
        })
        .await
        .unwrap();

        assert!(results.is_empty());
        assert!(api.selection_calls().is_empty());
        assert!(api.redeem_calls().is_empty());
        assert!(messages.iter().any(|m| m.contains("old-style choice")));
    }

    #[tokio::test]
    async fn test_cannot_redeem_is_skipped() {
        let mut locked = page(vec![("alpha", ChoiceGame {
            title: "Alpha".to_string(),
            tpkds: vec![tpk("alpha_steam")],
        })], &[]);
        locked.content_choice_options.can_redeem_games = false;
        let api = FakeApi::with_page("march-2024", locked);
        let mut session = ClaimSession::new();

        let mut messages = Vec::new();
        let results = process_choice(&api, &mut session, &order(), &mut |m| {
            messages.push(m.to_string());
        })
        .await
        .unwrap();

        assert!(results.is_empty());
        assert!(messages.iter().any(|m| m.contains("cannot redeem")));
    }

    #[tokio::test]
    async fn test_redeemed_plus_unredeemed_makes_one_selection_and_one_redemption() {
        let already = ChoiceGame {
            title: "Already Claimed".to_string(),
            tpkds: vec![ChoiceTpk {
                redeemed_key_val: Some("EXISTING-KEY".to_string()),
                ..tpk("already_steam")
            }],
        };
        let fresh = ChoiceGame {
            title: "Fresh Game".to_string(),
            tpkds: vec![tpk("fresh_steam")],
        };
        let api = FakeApi::with_page("march-2024", page(vec![("a", already), ("b", fresh)], &[]));
        let mut session = ClaimSession::new();

        let results = process_choice(&api, &mut session, &order(), &mut no_progress())
            .await
            .unwrap();

        // Exactly one selection call, naming only the item that needed it
        assert_eq!(api.selection_calls(), vec![vec!["b".to_string()]]);
        // Exactly one remote redemption
        assert_eq!(api.redeem_calls(), vec!["fresh_steam".to_string()]);

        assert_eq!(results.len(), 2);
        let existing = results.first().unwrap();
        assert_eq!(existing.key, "EXISTING-KEY");
        assert!(existing.is_success());
        let fresh = results.get(1).unwrap();
        assert_eq!(fresh.key, "KEY-fresh_steam");
        assert!(fresh.is_success());
        assert!(results.iter().all(|r| r.choice_title == "March 2024"));
    }

    #[tokio::test]
    async fn test_already_selected_items_never_trigger_selection() {
        let game = ChoiceGame {
            title: "Alpha".to_string(),
            tpkds: vec![tpk("alpha_steam")],
        };
        let api = FakeApi::with_page("march-2024", page(vec![("alpha", game)], &["alpha"]));
        let mut session = ClaimSession::new();

        // Two passes over the same unmodified page data
        for _ in 0..2 {
            let results = process_choice(&api, &mut session, &order(), &mut no_progress())
                .await
                .unwrap();
            assert_eq!(results.len(), 1);
        }

        assert!(api.selection_calls().is_empty());
        assert_eq!(api.redeem_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_isolation_within_an_order() {
        let flaky = ChoiceGame {
            title: "Flaky".to_string(),
            tpkds: vec![tpk("flaky_steam"), tpk("flaky_origin")],
        };
        let stable = ChoiceGame {
            title: "Stable".to_string(),
            tpkds: vec![tpk("stable_steam")],
        };
        let api = FakeApi::with_page("march-2024", page(vec![("flaky", flaky), ("stable", stable)], &[]))
            .failing("flaky_steam");
        let mut session = ClaimSession::new();

        let results = process_choice(&api, &mut session, &order(), &mut no_progress())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let failed = results.first().unwrap();
        assert!(!failed.is_success());
        assert!(failed.error.as_deref().unwrap().contains("No keys available"));
        // Sibling entitlement and the following item still processed
        assert_eq!(results.get(1).unwrap().key, "KEY-flaky_origin");
        assert_eq!(results.get(2).unwrap().key, "KEY-stable_steam");
    }

    #[tokio::test]
    async fn test_failed_item_is_skipped_on_retry() {
        let doomed = ChoiceGame {
            title: "Doomed".to_string(),
            tpkds: vec![tpk("doomed_steam")],
        };
        let healthy = ChoiceGame {
            title: "Healthy".to_string(),
            tpkds: vec![tpk("healthy_steam")],
        };
        let api = FakeApi::with_page(
            "march-2024",
            page(vec![("doomed", doomed), ("healthy", healthy)], &[]),
        )
        .failing("doomed_steam");
        let mut session = ClaimSession::new();

        let first = process_choice(&api, &mut session, &order(), &mut no_progress())
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert!(!first.first().unwrap().is_success());

        let second = process_choice(&api, &mut session, &order(), &mut no_progress())
            .await
            .unwrap();
        // The failed item is excluded from the candidate set entirely
        assert_eq!(second.len(), 1);
        assert_eq!(second.first().unwrap().machine_name, "healthy_steam");
        assert_eq!(
            api.redeem_calls(),
            vec!["doomed_steam", "healthy_steam", "healthy_steam"]
        );
        // Selection never re-includes the failed item
        assert!(
            api.selection_calls()
                .iter()
                .flatten()
                .all(|id| id != "doomed")
        );
    }

    #[tokio::test]
    async fn test_keyless_entitlements_are_silently_skipped() {
        let keyless = ChoiceGame {
            title: "Keyless Only".to_string(),
            tpkds: vec![ChoiceTpk {
                key_type: "origin_keyless".to_string(),
                ..tpk("keyless_game")
            }],
        };
        let api = FakeApi::with_page("march-2024", page(vec![("keyless", keyless)], &[]));
        let mut session = ClaimSession::new();

        let results = process_choice(&api, &mut session, &order(), &mut no_progress())
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(api.selection_calls().is_empty());
        assert!(api.redeem_calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_and_sold_out_labels_without_remote_calls() {
        let game = ChoiceGame {
            title: "Mixed".to_string(),
            tpkds: vec![
                ChoiceTpk {
                    is_expired: true,
                    ..tpk("expired_steam")
                },
                ChoiceTpk {
                    sold_out: true,
                    ..tpk("soldout_steam")
                },
            ],
        };
        let api = FakeApi::with_page("march-2024", page(vec![("mixed", game)], &[]));
        let mut session = ClaimSession::new();

        let results = process_choice(&api, &mut session, &order(), &mut no_progress())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.first().unwrap().error.as_deref(), Some("Expired"));
        assert_eq!(results.get(1).unwrap().error.as_deref(), Some("Sold out"));
        assert!(api.redeem_calls().is_empty());
        assert!(api.selection_calls().is_empty());
    }

    #[tokio::test]
    async fn test_order_failure_is_reported_and_others_proceed() {
        use crate::store::{Order, OrderProduct, Tpk, TpkdDict, encode_order};

        let good_game = ChoiceGame {
            title: "Good".to_string(),
            tpkds: vec![tpk("good_steam")],
        };
        // Only one of the two discovered orders has a page
        let api = FakeApi::with_page("good-url", page(vec![("good", good_game)], &[]));

        let mut store = MemoryStore::new();
        for (gamekey, url) in [("gk_missing", "missing-url"), ("gk_choice", "good-url")] {
            let raw = Order {
                created: String::new(),
                gamekey: gamekey.to_string(),
                product: OrderProduct {
                    category: "subscriptioncontent".to_string(),
                    human_name: format!("{gamekey} bundle"),
                    choice_url: Some(url.to_string()),
                },
                tpkd_dict: TpkdDict {
                    all_tpks: vec![Tpk::default()],
                },
            };
            store.set(&format!("v2|{gamekey}"), encode_order(&raw).unwrap());
        }

        let mut session = ClaimSession::new();
        let mut messages = Vec::new();
        let results = process_all_choices(&api, &store, &mut session, &mut |m| {
            messages.push(m.to_string());
        })
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results.first().unwrap().key, "KEY-good_steam");
        assert!(
            messages
                .iter()
                .any(|m| m.starts_with("Error processing gk_missing bundle"))
        );
    }

    #[tokio::test]
    async fn test_no_choice_orders_reports_progress() {
        let api = FakeApi::with_page("unused", page(vec![], &[]));
        let store = MemoryStore::new();
        let mut session = ClaimSession::new();

        let mut messages = Vec::new();
        let results = process_all_choices(&api, &store, &mut session, &mut |m| {
            messages.push(m.to_string());
        })
        .await;

        assert!(results.is_empty());
        assert_eq!(messages, vec!["No choice orders found".to_string()]);
    }

    #[tokio::test]
    async fn test_redeem_product_records_permanent_failures() {
        let api = FakeApi::with_page("unused", page(vec![], &[])).failing("dead_game");
        let mut session = ClaimSession::new();
        let product = Product {
            machine_name: "dead_game".to_string(),
            category: keyporter_core::Category::Bundle,
            category_id: "gk1".to_string(),
            category_human_name: "Bundle".to_string(),
            human_name: "Dead Game".to_string(),
            key_type: "steam".to_string(),
            claim_type: keyporter_core::ClaimType::None,
            redeemed_key_val: String::new(),
            is_gift: false,
            is_expired: false,
            expiry_date: String::new(),
            steam_app_id: None,
            created: String::new(),
            keyindex: 0,
            owned: keyporter_core::Owned::Unknown,
        };

        let first = redeem_product(&api, &mut session, &product).await;
        assert!(matches!(
            first,
            Err(HumbleError::Redeem { permanent: true, .. })
        ));
        assert!(session.key_permanently_failed("gk1", "dead_game"));

        // Second attempt short-circuits without a remote call
        let second = redeem_product(&api, &mut session, &product).await;
        assert!(second.is_err());
        assert_eq!(api.redeem_calls().len(), 1);
    }
}
