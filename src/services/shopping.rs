//! Per-pantry shopping list and restock suggestions.
//!
//! List entries consolidate on (name, measurement) the same way inventory
//! rows do. Suggestions are derived on read from the pantry's inventory and
//! the caller's dietary tags; nothing about them is stored.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ShoppingConfig;
use crate::db::activity_types::{SHOPPING_ADDED, SHOPPING_REMOVED};
use crate::db::{NewShoppingItem, PantryItem, PantryItemRepository, ShoppingItem, ShoppingRepository};
use crate::error::{AppError, AppResult};
use crate::inventory_rules::InventoryRules;
use crate::services::activity::ActivityService;
use crate::services::inventory::{format_amount, parse_amount, prepare, AmountInput, ItemCandidate};
use crate::services::membership::MembershipService;
use crate::AppState;

const MAX_NOTE_LEN: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingCandidate {
    pub name: Option<String>,
    pub amount: Option<AmountInput>,
    pub measurement: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingOutcome {
    pub merged: bool,
    pub item: ShoppingItem,
}

/// Ordered by urgency: earlier variants are listed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Expired,
    ExpiringSoon,
    RunningLow,
    DietStaple,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub name: String,
    pub kind: SuggestionKind,
    pub reason: String,
    /// Inventory row the suggestion was derived from.
    pub item_id: Option<String>,
}

fn classify(
    item: &PantryItem,
    config: &ShoppingConfig,
    today: NaiveDate,
    horizon: Option<NaiveDate>,
) -> Option<(SuggestionKind, String)> {
    if let Some(expiry) = item.expiry_date {
        if expiry < today {
            return Some((SuggestionKind::Expired, format!("Expired on {}", expiry)));
        }
        if horizon.map_or(false, |h| expiry <= h) {
            return Some((SuggestionKind::ExpiringSoon, format!("Expires on {}", expiry)));
        }
    }

    let amount = parse_amount(Some(&AmountInput::Text(item.amount.clone())));
    if amount < config.low_stock_threshold {
        return Some((
            SuggestionKind::RunningLow,
            format!("Running low ({} {} left)", item.amount, item.measurement),
        ));
    }
    None
}

/// Restock suggestions for one pantry, most urgent first.
///
/// Names already on the shopping list are skipped, each name is suggested
/// once, and diet staples are only offered when the pantry has none in stock.
pub fn suggest(
    items: &[PantryItem],
    list: &[ShoppingItem],
    dietary_tags: &[String],
    rules: &InventoryRules,
    config: &ShoppingConfig,
    today: NaiveDate,
) -> Vec<Suggestion> {
    let on_list: HashSet<&str> = list.iter().map(|i| i.normalized_name.as_str()).collect();
    let horizon = Duration::try_days(config.expiring_within_days.max(0))
        .and_then(|window| today.checked_add_signed(window));

    let mut suggestions: Vec<Suggestion> = items
        .iter()
        .filter(|item| !on_list.contains(item.normalized_name.as_str()))
        .filter_map(|item| {
            classify(item, config, today, horizon).map(|(kind, reason)| Suggestion {
                name: item.name.clone(),
                kind,
                reason,
                item_id: Some(item.id.clone()),
            })
        })
        .collect();
    // stable, so inventory order survives within a kind
    suggestions.sort_by_key(|s| s.kind);

    let mut seen: HashSet<String> = HashSet::new();
    suggestions.retain(|s| seen.insert(s.name.to_lowercase()));

    let in_stock: HashSet<&str> = items.iter().map(|i| i.normalized_name.as_str()).collect();
    for diet in dietary_tags {
        for staple in rules.staples_for(diet) {
            let key = staple.to_lowercase();
            if in_stock.contains(key.as_str()) || on_list.contains(key.as_str()) || seen.contains(&key) {
                continue;
            }
            seen.insert(key);
            suggestions.push(Suggestion {
                name: staple.clone(),
                kind: SuggestionKind::DietStaple,
                reason: format!("Recommended for {} diet", diet),
                item_id: None,
            });
        }
    }

    suggestions.truncate(config.max_suggestions);
    suggestions
}

pub struct ShoppingService;

impl ShoppingService {
    pub async fn list(state: &Arc<AppState>, user_id: &str) -> AppResult<Vec<ShoppingItem>> {
        let mut conn = state.db.acquire().await?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;
        let pantry = MembershipService::resolve_inventory_pantry(&mut conn, &state.config, &user).await?;
        ShoppingRepository::list(&mut conn, &pantry.id).await
    }

    /// Put an entry on the caller's list, topping up a matching one.
    pub async fn add(
        state: &Arc<AppState>,
        user_id: &str,
        candidate: ShoppingCandidate,
    ) -> AppResult<ShoppingOutcome> {
        let note = candidate
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if note.as_ref().map_or(false, |n| n.chars().count() > MAX_NOTE_LEN) {
            return Err(AppError::Validation(format!(
                "Note cannot exceed {} characters",
                MAX_NOTE_LEN
            )));
        }
        let prepared = prepare(
            &state.rules,
            &ItemCandidate {
                name: candidate.name,
                amount: candidate.amount,
                measurement: candidate.measurement,
                ..Default::default()
            },
            Utc::now().date_naive(),
        )?;

        let (user, pantry, _guard) = MembershipService::lock_inventory_pantry(state, user_id).await?;
        let mut tx = state.begin_write().await?;

        let existing = ShoppingRepository::find_by_key(
            &mut tx,
            &pantry.id,
            &prepared.normalized_name,
            &prepared.measurement,
        )
        .await?;
        let (item, merged) = match existing {
            Some(existing) => {
                let current = parse_amount(Some(&AmountInput::Text(existing.amount.clone())));
                let amount = format_amount(current + prepared.amount);
                let item = ShoppingRepository::top_up(&mut tx, &existing.id, &amount, note.as_deref()).await?;
                (item, true)
            }
            None => {
                let item = ShoppingRepository::insert(
                    &mut tx,
                    NewShoppingItem {
                        pantry_id: pantry.id.clone(),
                        name: prepared.name,
                        normalized_name: prepared.normalized_name,
                        amount: format_amount(prepared.amount),
                        measurement: prepared.measurement,
                        note,
                        added_by: user.id.clone(),
                    },
                )
                .await?;
                (item, false)
            }
        };

        if !merged {
            ActivityService::record_quietly(
                &mut tx,
                &state.config.activity,
                &pantry.id,
                &user,
                SHOPPING_ADDED,
                json!({ "itemName": item.name }),
            )
            .await;
        }

        tx.commit().await?;
        tracing::debug!("'{}' on the shopping list of pantry '{}'", item.name, pantry.name);

        Ok(ShoppingOutcome { merged, item })
    }

    pub async fn remove(state: &Arc<AppState>, user_id: &str, item_id: &str) -> AppResult<ShoppingItem> {
        let (user, pantry, _guard) = MembershipService::lock_inventory_pantry(state, user_id).await?;
        let mut tx = state.begin_write().await?;

        let item = ShoppingRepository::delete(&mut tx, &pantry.id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Shopping list entry {}", item_id)))?;

        ActivityService::record_quietly(
            &mut tx,
            &state.config.activity,
            &pantry.id,
            &user,
            SHOPPING_REMOVED,
            json!({ "itemName": item.name }),
        )
        .await;

        tx.commit().await?;
        Ok(item)
    }

    pub async fn suggestions(state: &Arc<AppState>, user_id: &str) -> AppResult<Vec<Suggestion>> {
        let mut conn = state.db.acquire().await?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;
        let pantry = MembershipService::resolve_inventory_pantry(&mut conn, &state.config, &user).await?;

        let items = PantryItemRepository::list(&mut conn, &pantry.id).await?;
        let list = ShoppingRepository::list(&mut conn, &pantry.id).await?;

        Ok(suggest(
            &items,
            &list,
            &user.dietary_tags(),
            &state.rules,
            &state.config.shopping,
            Utc::now().date_naive(),
        ))
    }
}
