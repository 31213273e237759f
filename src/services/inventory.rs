//! Item consolidation.
//!
//! A submission whose normalized (name, measurement) matches an existing row
//! in the same pantry is folded into that row: amounts are summed, the later
//! expiry is kept, the purchase date moves to the submission's, and an
//! explicit category replaces the stored one. Anything else becomes a new row.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;

use crate::db::activity_types::{ITEM_ADDED, ITEM_MERGED, ITEM_REMOVED};
use crate::db::{MergedPantryItem, NewPantryItem, PantryItem, PantryItemRepository};
use crate::error::{AppError, AppResult};
use crate::inventory_rules::InventoryRules;
use crate::services::activity::ActivityService;
use crate::services::membership::MembershipService;
use crate::AppState;

const MAX_BATCH: usize = 200;
const MAX_NAME_LEN: usize = 120;

/// Amounts arrive as JSON numbers or free text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCandidate {
    pub name: Option<String>,
    pub amount: Option<AmountInput>,
    pub measurement: Option<String>,
    pub category: Option<String>,
    pub expiry_date: Option<String>,
    pub purchase_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub amount: String,
    pub measurement: String,
    pub category: String,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub expired: bool,
}

impl ItemView {
    pub fn new(item: PantryItem, today: NaiveDate) -> Self {
        Self {
            expired: item.is_expired(today),
            id: item.id,
            name: item.name,
            amount: item.amount,
            measurement: item.measurement,
            category: item.category,
            purchase_date: item.purchase_date,
            expiry_date: item.expiry_date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub merged: bool,
    pub item: ItemView,
}

/// A candidate after normalization. Category and expiry stay `None` unless
/// the submitter supplied them.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedItem {
    pub name: String,
    pub normalized_name: String,
    pub amount: f64,
    pub measurement: String,
    pub category: Option<String>,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

pub fn parse_amount(raw: Option<&AmountInput>) -> f64 {
    let value = match raw {
        Some(AmountInput::Number(n)) => Some(*n),
        Some(AmountInput::Text(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    };
    value.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(1.0)
}

/// Whole numbers print without a fraction; others keep up to four decimals.
pub fn format_amount(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        return format!("{}", rounded as i64);
    }
    let s = format!("{:.4}", rounded);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `YYYY-MM-DD` or an RFC 3339 timestamp; anything else counts as absent.
pub fn parse_date_lenient(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.date_naive()),
        Err(_) => {
            tracing::debug!("Ignoring unparseable date {:?}", raw);
            None
        }
    }
}

/// Later of two expiry dates. A missing side never erases the other.
pub fn later_expiry(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

pub fn prepare(
    rules: &InventoryRules,
    candidate: &ItemCandidate,
    today: NaiveDate,
) -> AppResult<PreparedItem> {
    let name = candidate
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("Item name is required".to_string()))?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Item name cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }

    Ok(PreparedItem {
        name: name.to_string(),
        normalized_name: name.to_lowercase(),
        amount: parse_amount(candidate.amount.as_ref()),
        measurement: rules.normalize_measurement(candidate.measurement.as_deref()),
        category: candidate
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        purchase_date: parse_date_lenient(candidate.purchase_date.as_deref()).unwrap_or(today),
        expiry_date: parse_date_lenient(candidate.expiry_date.as_deref()),
    })
}

/// Fold `incoming` into `existing`.
pub fn merge(rules: &InventoryRules, existing: &PantryItem, incoming: &PreparedItem) -> MergedPantryItem {
    let current = parse_amount(Some(&AmountInput::Text(existing.amount.clone())));
    let category = incoming
        .category
        .clone()
        .unwrap_or_else(|| existing.category.clone());
    let incoming_expiry = incoming.expiry_date.or_else(|| {
        rules.infer_expiry(&incoming.normalized_name, &category, incoming.purchase_date)
    });

    MergedPantryItem {
        amount: format_amount(current + incoming.amount),
        expiry_date: later_expiry(existing.expiry_date, incoming_expiry),
        purchase_date: incoming.purchase_date,
        category,
    }
}

pub struct InventoryService;

impl InventoryService {
    pub async fn add_item(
        state: &Arc<AppState>,
        user_id: &str,
        candidate: ItemCandidate,
    ) -> AppResult<AddOutcome> {
        Self::add_items(state, user_id, vec![candidate])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("consolidation produced no item")))
    }

    /// Apply a batch in order under one lock and one transaction.
    pub async fn add_items(
        state: &Arc<AppState>,
        user_id: &str,
        candidates: Vec<ItemCandidate>,
    ) -> AppResult<Vec<AddOutcome>> {
        if candidates.is_empty() {
            return Err(AppError::Validation("At least one item is required".to_string()));
        }
        if candidates.len() > MAX_BATCH {
            return Err(AppError::Validation(format!(
                "A batch cannot hold more than {} items",
                MAX_BATCH
            )));
        }

        let today = Utc::now().date_naive();
        let prepared = candidates
            .iter()
            .map(|c| prepare(&state.rules, c, today))
            .collect::<AppResult<Vec<_>>>()?;

        let (user, pantry, _guard) = MembershipService::lock_inventory_pantry(state, user_id).await?;
        let mut tx = state.begin_write().await?;

        let mut outcomes = Vec::with_capacity(prepared.len());
        for incoming in prepared {
            let (item, merged) = Self::consolidate(&mut tx, &state.rules, &pantry.id, incoming).await?;
            ActivityService::record_quietly(
                &mut tx,
                &state.config.activity,
                &pantry.id,
                &user,
                if merged { ITEM_MERGED } else { ITEM_ADDED },
                json!({
                    "itemName": item.name,
                    "amount": item.amount,
                    "measurement": item.measurement,
                }),
            )
            .await;
            outcomes.push(AddOutcome {
                merged,
                item: ItemView::new(item, today),
            });
        }

        tx.commit().await?;
        tracing::debug!(
            "{} item(s) submitted to pantry '{}' by {}",
            outcomes.len(),
            pantry.name,
            user.id
        );

        Ok(outcomes)
    }

    async fn consolidate(
        conn: &mut SqliteConnection,
        rules: &InventoryRules,
        pantry_id: &str,
        incoming: PreparedItem,
    ) -> AppResult<(PantryItem, bool)> {
        let existing = PantryItemRepository::find_by_key(
            conn,
            pantry_id,
            &incoming.normalized_name,
            &incoming.measurement,
        )
        .await?;

        if let Some(existing) = existing {
            let merged = merge(rules, &existing, &incoming);
            let item = PantryItemRepository::apply_merge(conn, &existing.id, &merged).await?;
            tracing::debug!("Merged '{}' into {} (now {})", incoming.name, item.id, item.amount);
            return Ok((item, true));
        }

        let category = incoming
            .category
            .unwrap_or_else(|| rules.infer_category(&incoming.normalized_name));
        let expiry_date = incoming.expiry_date.or_else(|| {
            rules.infer_expiry(&incoming.normalized_name, &category, incoming.purchase_date)
        });

        let item = PantryItemRepository::insert(
            conn,
            NewPantryItem {
                pantry_id: pantry_id.to_string(),
                name: incoming.name,
                normalized_name: incoming.normalized_name,
                amount: format_amount(incoming.amount),
                measurement: incoming.measurement,
                category,
                purchase_date: incoming.purchase_date,
                expiry_date,
            },
        )
        .await?;
        Ok((item, false))
    }

    pub async fn list_items(state: &Arc<AppState>, user_id: &str) -> AppResult<Vec<ItemView>> {
        let today = Utc::now().date_naive();
        let mut conn = state.db.acquire().await?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;
        let pantry = MembershipService::resolve_inventory_pantry(&mut conn, &state.config, &user).await?;

        let items = PantryItemRepository::list(&mut conn, &pantry.id).await?;
        Ok(items.into_iter().map(|i| ItemView::new(i, today)).collect())
    }

    /// Distinct item names in inventory order.
    pub async fn ingredient_names(state: &Arc<AppState>, user_id: &str) -> AppResult<Vec<String>> {
        let items = Self::list_items(state, user_id).await?;
        let mut names: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&item.name)) {
                names.push(item.name);
            }
        }
        Ok(names)
    }

    pub async fn delete_item(state: &Arc<AppState>, user_id: &str, item_id: &str) -> AppResult<ItemView> {
        let (user, pantry, _guard) = MembershipService::lock_inventory_pantry(state, user_id).await?;
        let mut tx = state.begin_write().await?;

        let item = PantryItemRepository::delete(&mut tx, &pantry.id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {}", item_id)))?;

        ActivityService::record_quietly(
            &mut tx,
            &state.config.activity,
            &pantry.id,
            &user,
            ITEM_REMOVED,
            json!({ "itemName": item.name }),
        )
        .await;

        tx.commit().await?;
        tracing::debug!("Item {} removed from pantry '{}'", item.id, pantry.name);

        Ok(ItemView::new(item, Utc::now().date_naive()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn candidate(name: &str, amount: AmountInput, measurement: Option<&str>) -> ItemCandidate {
        ItemCandidate {
            name: Some(name.to_string()),
            amount: Some(amount),
            measurement: measurement.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn amounts_are_parsed_leniently() {
        assert_eq!(parse_amount(Some(&AmountInput::Number(2.5))), 2.5);
        assert_eq!(parse_amount(Some(&AmountInput::Text(" 3 ".into()))), 3.0);
        assert_eq!(parse_amount(Some(&AmountInput::Text("a handful".into()))), 1.0);
        assert_eq!(parse_amount(Some(&AmountInput::Number(-4.0))), 1.0);
        assert_eq!(parse_amount(None), 1.0);
    }

    #[test]
    fn amounts_format_as_integers_when_whole() {
        assert_eq!(format_amount(5.0), "5");
        assert_eq!(format_amount(2.5), "2.5");
        assert_eq!(format_amount(0.1 + 0.2), "0.3");
        assert_eq!(format_amount(1.0 / 3.0), "0.3333");
    }

    #[test]
    fn dates_accept_plain_and_rfc3339() {
        assert_eq!(parse_date_lenient(Some("2025-03-01")), Some(date("2025-03-01")));
        assert_eq!(
            parse_date_lenient(Some("2025-03-01T18:30:00Z")),
            Some(date("2025-03-01"))
        );
        assert_eq!(parse_date_lenient(Some("next tuesday")), None);
        assert_eq!(parse_date_lenient(Some("")), None);
    }

    #[test]
    fn later_expiry_never_erases() {
        let early = Some(date("2025-03-05"));
        let late = Some(date("2025-03-20"));
        assert_eq!(later_expiry(early, late), late);
        assert_eq!(later_expiry(late, early), late);
        assert_eq!(later_expiry(early, None), early);
        assert_eq!(later_expiry(None, late), late);
    }

    #[test]
    fn prepare_requires_a_name() {
        let rules = InventoryRules::embedded().unwrap();
        let err = prepare(&rules, &ItemCandidate::default(), date("2025-03-01")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn same_name_any_case_is_consolidated() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;

        let first = InventoryService::add_item(
            &state,
            "ana@example.com",
            candidate("Egg", AmountInput::Number(2.0), None),
        )
        .await
        .unwrap();
        let second = InventoryService::add_item(
            &state,
            "ana@example.com",
            candidate(" egg ", AmountInput::Text("3".into()), Some("pcs")),
        )
        .await
        .unwrap();

        assert!(!first.merged);
        assert!(second.merged);
        assert_eq!(first.item.id, second.item.id);

        let items = InventoryService::list_items(&state, "ana@example.com").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Egg");
        assert_eq!(items[0].amount, "5");
        assert_eq!(items[0].measurement, "unit");
        assert_eq!(items[0].category, "Dairy");
    }

    #[tokio::test]
    async fn different_measurements_stay_separate() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;

        InventoryService::add_items(
            &state,
            "ana@example.com",
            vec![
                candidate("Rice", AmountInput::Number(1.0), Some("unit")),
                candidate("Rice", AmountInput::Number(200.0), Some("g")),
            ],
        )
        .await
        .unwrap();

        let items = InventoryService::list_items(&state, "ana@example.com").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].amount, "1");
        assert_eq!(items[1].amount, "200");
        assert_eq!(items[1].measurement, "g");

        let names = InventoryService::ingredient_names(&state, "ana@example.com").await.unwrap();
        assert_eq!(names, vec!["Rice".to_string()]);
    }

    #[tokio::test]
    async fn merge_keeps_the_later_expiry() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        let with_dates = |expiry: &str, bought: &str| ItemCandidate {
            name: Some("Milk".into()),
            amount: Some(AmountInput::Number(1.0)),
            expiry_date: Some(expiry.into()),
            purchase_date: Some(bought.into()),
            ..Default::default()
        };

        InventoryService::add_item(&state, "ana@example.com", with_dates("2025-03-10", "2025-03-01"))
            .await
            .unwrap();
        let later = InventoryService::add_item(&state, "ana@example.com", with_dates("2025-03-15", "2025-03-05"))
            .await
            .unwrap();
        assert_eq!(later.item.expiry_date, Some(date("2025-03-15")));
        assert_eq!(later.item.purchase_date, date("2025-03-05"));

        let earlier = InventoryService::add_item(&state, "ana@example.com", with_dates("2025-03-08", "2025-03-06"))
            .await
            .unwrap();
        assert_eq!(earlier.item.expiry_date, Some(date("2025-03-15")));
        assert_eq!(earlier.item.amount, "3");
        assert!(earlier.item.expired);
    }

    #[tokio::test]
    async fn explicit_category_overwrites_on_merge() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;

        let added = InventoryService::add_item(
            &state,
            "ana@example.com",
            ItemCandidate {
                name: Some("Baby Spinach".into()),
                purchase_date: Some("2025-03-01".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(added.item.category, "Produce");
        assert_eq!(added.item.expiry_date, Some(date("2025-03-04")));
        assert_eq!(added.item.amount, "1");

        let merged = InventoryService::add_item(
            &state,
            "ana@example.com",
            ItemCandidate {
                name: Some("baby spinach".into()),
                category: Some("Frozen".into()),
                purchase_date: Some("2025-03-01".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(merged.item.category, "Frozen");
        assert_eq!(merged.item.amount, "2");
    }

    #[tokio::test]
    async fn delete_records_activity_and_reports_missing() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        let added = InventoryService::add_item(
            &state,
            "ana@example.com",
            candidate("Honey", AmountInput::Number(1.0), Some("jar")),
        )
        .await
        .unwrap();
        assert_eq!(added.item.expiry_date, None);

        let removed = InventoryService::delete_item(&state, "ana@example.com", &added.item.id)
            .await
            .unwrap();
        assert_eq!(removed.name, "Honey");

        let err = InventoryService::delete_item(&state, "ana@example.com", &added.item.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let feed = ActivityService::list(&state, "ana@example.com", None).await.unwrap();
        assert_eq!(feed[0].activity_type, ITEM_REMOVED);
        assert_eq!(feed[1].activity_type, ITEM_ADDED);
    }

    #[tokio::test]
    async fn callers_without_pantry_use_the_default_inventory() {
        let state = test_support::state().await;
        test_support::user(&state, "ana@example.com", "Ana").await;
        test_support::user(&state, "ben@example.com", "Ben").await;

        InventoryService::add_item(
            &state,
            "ana@example.com",
            candidate("Bread", AmountInput::Number(1.0), None),
        )
        .await
        .unwrap();

        let seen_by_ben = InventoryService::list_items(&state, "ben@example.com").await.unwrap();
        assert_eq!(seen_by_ben.len(), 1);
        assert_eq!(seen_by_ben[0].name, "Bread");
    }

    #[tokio::test]
    async fn invalid_batch_is_rejected_before_any_write() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;

        let err = InventoryService::add_items(
            &state,
            "ana@example.com",
            vec![
                candidate("Apples", AmountInput::Number(3.0), None),
                ItemCandidate::default(),
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(InventoryService::list_items(&state, "ana@example.com").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_to_one_pantry_all_land() {
        let (state, _dir) = test_support::file_state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        test_support::member_of(&state, "ben@example.com", "Ben", "Kitchen42").await;

        let mut tasks = Vec::new();
        for i in 0..20 {
            let state = state.clone();
            let user = if i % 2 == 0 { "ana@example.com" } else { "ben@example.com" };
            tasks.push(tokio::spawn(async move {
                InventoryService::add_item(&state, user, candidate("Rice", AmountInput::Number(1.5), Some("kg")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let items = InventoryService::list_items(&state, "ana@example.com").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, "30");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn distinct_pantries_accept_writes_side_by_side() {
        let (state, _dir) = test_support::file_state().await;
        let owners: Vec<String> = (0..4).map(|i| format!("cook{}@example.com", i)).collect();
        for (i, owner) in owners.iter().enumerate() {
            test_support::user_in_pantry(&state, owner, "Cook", &format!("Kitchen{}", i)).await;
        }

        let mut tasks = Vec::new();
        for i in 0..100 {
            let state = state.clone();
            let owner = owners[i % owners.len()].clone();
            tasks.push(tokio::spawn(async move {
                InventoryService::add_item(&state, &owner, candidate("Beans", AmountInput::Number(1.0), Some("can")))
                    .await
            }));
        }
        let mut failures = Vec::new();
        for task in tasks {
            if let Err(e) = task.await.unwrap() {
                failures.push(e.to_string());
            }
        }
        assert!(failures.is_empty(), "writes failed: {:?}", failures);

        for owner in &owners {
            let items = InventoryService::list_items(&state, owner).await.unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].amount, "25");
        }
    }
}
