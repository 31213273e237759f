use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::SqliteConnection;

use crate::config::ActivityConfig;
use crate::db::activity_types::*;
use crate::db::{item_name_of, ActivityRecord, ActivityRepository, CreateActivity, User};
use crate::error::{AppError, AppResult};
use crate::services::membership::MembershipService;
use crate::AppState;

pub struct ActivityService;

impl ActivityService {
    /// Record an activity in the caller's pantry feed.
    ///
    /// Returns `Ok(None)` when an identical event from the same user was
    /// recorded inside the dedup window; that is not an error.
    pub async fn record(
        state: &Arc<AppState>,
        user_id: &str,
        activity_type: &str,
        activity_data: serde_json::Value,
        description: Option<String>,
    ) -> AppResult<Option<ActivityRecord>> {
        Self::record_at(
            state,
            user_id,
            activity_type,
            activity_data,
            description,
            Utc::now().naive_utc(),
        )
        .await
    }

    pub(crate) async fn record_at(
        state: &Arc<AppState>,
        user_id: &str,
        activity_type: &str,
        activity_data: serde_json::Value,
        description: Option<String>,
        now: NaiveDateTime,
    ) -> AppResult<Option<ActivityRecord>> {
        let activity_type = validate_activity_type(activity_type)?;
        if !(activity_data.is_object() || activity_data.is_null()) {
            return Err(AppError::Validation(
                "activityData must be a JSON object".to_string(),
            ));
        }

        let (user, pantry, _guard) = MembershipService::lock_inventory_pantry(state, user_id).await?;

        let mut tx = state.begin_write().await?;
        let record = Self::record_in(
            &mut tx,
            &state.config.activity,
            &pantry.id,
            &user,
            &activity_type,
            activity_data,
            description,
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Dedup-checked append inside an open transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_in(
        conn: &mut SqliteConnection,
        config: &ActivityConfig,
        pantry_id: &str,
        user: &User,
        activity_type: &str,
        activity_data: serde_json::Value,
        description: Option<String>,
        now: NaiveDateTime,
    ) -> AppResult<Option<ActivityRecord>> {
        let activity_data = if activity_data.is_null() {
            serde_json::json!({})
        } else {
            activity_data
        };
        let item_name = item_name_of(&activity_data);

        let recent = ActivityRepository::recent(conn, pantry_id, config.dedup_scan_depth).await?;
        if is_duplicate(
            &recent,
            &user.id,
            activity_type,
            item_name.as_deref(),
            now,
            config.dedup_window_seconds,
        ) {
            tracing::debug!(
                "Suppressed duplicate '{}' activity from {} in pantry {}",
                activity_type,
                user.id,
                pantry_id
            );
            return Ok(None);
        }

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| describe(&user.display_name, activity_type, item_name.as_deref()));

        let record = ActivityRepository::insert(
            conn,
            CreateActivity {
                pantry_id: pantry_id.to_string(),
                user_id: user.id.clone(),
                user_name: user.display_name.clone(),
                activity_type: activity_type.to_string(),
                activity_data,
                description,
            },
            now,
        )
        .await?;

        let pruned = ActivityRepository::prune(conn, pantry_id, config.retention).await?;
        if pruned > 0 {
            tracing::debug!("Pruned {} old activity records from {}", pruned, pantry_id);
        }

        Ok(Some(record))
    }

    /// Engine-side recording: a failure is logged and never fails the caller.
    pub async fn record_quietly(
        conn: &mut SqliteConnection,
        config: &ActivityConfig,
        pantry_id: &str,
        user: &User,
        activity_type: &str,
        activity_data: serde_json::Value,
    ) {
        let now = Utc::now().naive_utc();
        if let Err(e) = Self::record_in(
            conn,
            config,
            pantry_id,
            user,
            activity_type,
            activity_data,
            None,
            now,
        )
        .await
        {
            tracing::warn!(
                "Failed to record '{}' activity for pantry {}: {:?}",
                activity_type,
                pantry_id,
                e
            );
        }
    }

    /// Newest-first feed of the caller's pantry.
    pub async fn list(
        state: &Arc<AppState>,
        user_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<ActivityRecord>> {
        let retention = state.config.activity.retention.max(1);
        let limit = limit.unwrap_or(50).clamp(1, retention);

        let mut conn = state.db.acquire().await?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;
        let pantry = MembershipService::resolve_inventory_pantry(&mut conn, &state.config, &user).await?;
        ActivityRepository::recent(&mut conn, &pantry.id, limit).await
    }
}

fn validate_activity_type(raw: &str) -> AppResult<String> {
    let t = raw.trim().to_lowercase();
    if t.is_empty() {
        return Err(AppError::Validation("activityType is required".to_string()));
    }
    if t.len() > 64 {
        return Err(AppError::Validation(
            "activityType cannot exceed 64 characters".to_string(),
        ));
    }
    Ok(t)
}

/// True when `recent` already holds the same event from the same user inside the window.
pub fn is_duplicate(
    recent: &[ActivityRecord],
    user_id: &str,
    activity_type: &str,
    item_name: Option<&str>,
    now: NaiveDateTime,
    window_seconds: i64,
) -> bool {
    let Some(window) = Duration::try_seconds(window_seconds) else {
        return false;
    };
    recent.iter().any(|r| {
        let elapsed = now.signed_duration_since(r.created_at);
        r.user_id == user_id
            && r.activity_type == activity_type
            && same_item(r.item_name().as_deref(), item_name)
            && elapsed < window
            && elapsed > -window
    })
}

fn same_item(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        (None, None) => true,
        _ => false,
    }
}

pub fn describe(user_name: &str, activity_type: &str, item_name: Option<&str>) -> String {
    match (activity_type, item_name) {
        (ITEM_ADDED, Some(item)) => format!("{} added {}", user_name, item),
        (ITEM_MERGED, Some(item)) => format!("{} restocked {}", user_name, item),
        (ITEM_REMOVED, Some(item)) => format!("{} removed {}", user_name, item),
        (SHOPPING_ADDED, Some(item)) => format!("{} put {} on the shopping list", user_name, item),
        (SHOPPING_REMOVED, Some(item)) => {
            format!("{} took {} off the shopping list", user_name, item)
        }
        (PANTRY_CREATED, _) => format!("{} created the pantry", user_name),
        (MEMBER_JOINED, _) => format!("{} joined the pantry", user_name),
        (MEMBER_LEFT, _) => format!("{} left the pantry", user_name),
        (OWNERSHIP_TRANSFERRED, _) => format!("{} is now the pantry owner", user_name),
        (JOIN_REQUESTED, _) => format!("{} asked to join the pantry", user_name),
        (JOIN_REJECTED, _) => format!("{}'s join request was declined", user_name),
        (other, Some(item)) => format!("{} {} {}", user_name, other.replace('_', " "), item),
        (other, None) => format!("{} {}", user_name, other.replace('_', " ")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support;

    fn at(base: NaiveDateTime, secs: i64) -> NaiveDateTime {
        base + Duration::seconds(secs)
    }

    fn record(user: &str, kind: &str, item: &str, created_at: NaiveDateTime) -> ActivityRecord {
        ActivityRecord {
            id: 1,
            pantry_id: "p".into(),
            user_id: user.into(),
            user_name: user.into(),
            activity_type: kind.into(),
            activity_data: json!({ "itemName": item }).to_string(),
            description: String::new(),
            created_at,
        }
    }

    #[test]
    fn duplicate_requires_same_user_type_item_and_window() {
        let t0 = Utc::now().naive_utc();
        let recent = vec![record("a@x.io", ITEM_ADDED, "Milk", t0)];

        assert!(is_duplicate(&recent, "a@x.io", ITEM_ADDED, Some("milk"), at(t0, 9), 10));
        assert!(!is_duplicate(&recent, "a@x.io", ITEM_ADDED, Some("milk"), at(t0, 10), 10));
        assert!(!is_duplicate(&recent, "b@x.io", ITEM_ADDED, Some("milk"), at(t0, 1), 10));
        assert!(!is_duplicate(&recent, "a@x.io", ITEM_REMOVED, Some("milk"), at(t0, 1), 10));
        assert!(!is_duplicate(&recent, "a@x.io", ITEM_ADDED, Some("eggs"), at(t0, 1), 10));
        assert!(!is_duplicate(&recent, "a@x.io", ITEM_ADDED, None, at(t0, 1), 10));
    }

    #[test]
    fn out_of_range_window_disables_dedup() {
        let t0 = Utc::now().naive_utc();
        let recent = vec![record("a@x.io", ITEM_ADDED, "Milk", t0)];
        assert!(!is_duplicate(&recent, "a@x.io", ITEM_ADDED, Some("milk"), at(t0, 1), i64::MAX));
    }

    #[test]
    fn descriptions_name_the_actor() {
        assert_eq!(describe("Ana", ITEM_ADDED, Some("Eggs")), "Ana added Eggs");
        assert_eq!(describe("Ana", MEMBER_JOINED, None), "Ana joined the pantry");
        assert_eq!(describe("Ana", "recipe_cooked", Some("Soup")), "Ana recipe cooked Soup");
    }

    #[tokio::test]
    async fn repeated_submission_inside_window_is_recorded_once() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        let t0 = Utc::now().naive_utc();
        let data = json!({ "itemName": "Tomato" });

        let first = ActivityService::record_at(&state, "ana@example.com", "item_added", data.clone(), None, t0)
            .await
            .unwrap();
        let second = ActivityService::record_at(
            &state,
            "ana@example.com",
            "item_added",
            json!({ "itemName": "TOMATO" }),
            None,
            at(t0, 4),
        )
        .await
        .unwrap();
        let other_item = ActivityService::record_at(
            &state,
            "ana@example.com",
            "item_added",
            json!({ "itemName": "Basil" }),
            None,
            at(t0, 5),
        )
        .await
        .unwrap();
        let after_window = ActivityService::record_at(&state, "ana@example.com", "item_added", data, None, at(t0, 11))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(other_item.is_some());
        assert!(after_window.is_some());

        let feed = ActivityService::list(&state, "ana@example.com", None).await.unwrap();
        let tomato_events = feed
            .iter()
            .filter(|r| r.activity_type == "item_added" && r.item_name().as_deref() == Some("Tomato"))
            .count();
        assert_eq!(tomato_events, 2);
        assert_eq!(feed[0].item_name().as_deref(), Some("Tomato"));
        assert_eq!(feed[0].description, "Ana added Tomato");
    }

    #[tokio::test]
    async fn log_is_truncated_to_retention() {
        let state = test_support::state_with(|c| c.activity.retention = 5).await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        let t0 = Utc::now().naive_utc();

        for i in 0..8 {
            ActivityService::record_at(
                &state,
                "ana@example.com",
                "recipe_cooked",
                json!({ "itemName": format!("Dish {}", i) }),
                None,
                at(t0, i),
            )
            .await
            .unwrap();
        }

        let feed = ActivityService::list(&state, "ana@example.com", Some(100)).await.unwrap();
        assert_eq!(feed.len(), 5);
        assert_eq!(feed[0].item_name().as_deref(), Some("Dish 7"));
        assert_eq!(feed[4].item_name().as_deref(), Some("Dish 3"));
    }

    #[tokio::test]
    async fn rejects_non_object_payloads() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;

        let err = ActivityService::record(&state, "ana@example.com", "note", json!([1, 2]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = ActivityService::record(&state, "ana@example.com", "  ", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
