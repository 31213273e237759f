use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;

use crate::config::Config;
use crate::db::activity_types::*;
use crate::db::{Pantry, PantryRepository, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::locks::PantryGuard;
use crate::services::activity::ActivityService;
use crate::AppState;

const MAX_PANTRY_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignOutcome {
    pub pantry: Pantry,
    /// True when this call established the pantry's ownership.
    pub is_new_pantry: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveOutcome {
    pub left_pantry: Option<String>,
    pub new_owner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PantryInfo {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub is_owner: bool,
    pub member_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub is_owner: bool,
    pub joined_at: Option<NaiveDateTime>,
}

pub struct MembershipService;

impl MembershipService {
    pub async fn get_user(conn: &mut SqliteConnection, user_id: &str) -> AppResult<User> {
        UserRepository::find_by_id(conn, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))
    }

    /// Pantry used for the caller's inventory and feed. Callers without a
    /// pantry share the reserved default one, created at startup.
    pub async fn resolve_inventory_pantry(
        conn: &mut SqliteConnection,
        config: &Config,
        user: &User,
    ) -> AppResult<Pantry> {
        if let Some(pantry_id) = &user.pantry_id {
            return PantryRepository::find_by_id(conn, pantry_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Pantry {}", pantry_id)));
        }
        let name = &config.pantry.default_pantry_name;
        PantryRepository::find_by_name(conn, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Default pantry '{}'", name)))
    }

    /// Resolve the caller's inventory pantry and hold its lock.
    ///
    /// The assignment is re-read once the lock is held; if it moved in the
    /// meantime the caller gets a `Conflict` and should retry.
    pub async fn lock_inventory_pantry(
        state: &Arc<AppState>,
        user_id: &str,
    ) -> AppResult<(User, Pantry, PantryGuard)> {
        let pantry = {
            let mut conn = state.db.acquire().await?;
            let user = Self::get_user(&mut conn, user_id).await?;
            Self::resolve_inventory_pantry(&mut conn, &state.config, &user).await?
        };

        let guard = state.locks.acquire(&pantry.name).await;

        let mut conn = state.db.acquire().await?;
        let user = Self::get_user(&mut conn, user_id).await?;
        let current = Self::resolve_inventory_pantry(&mut conn, &state.config, &user).await?;
        if current.id != pantry.id {
            return Err(AppError::Conflict(
                "Pantry membership changed, please retry".to_string(),
            ));
        }

        Ok((user, current, guard))
    }

    /// Put the caller in `pantry_name`, claiming it when nobody owns it.
    pub async fn assign_pantry(
        state: &Arc<AppState>,
        user_id: &str,
        pantry_name: &str,
    ) -> AppResult<AssignOutcome> {
        let name = normalize_pantry_name(pantry_name)?;
        if is_reserved(&state.config, &name) {
            return Err(AppError::Validation(format!(
                "'{}' is reserved and cannot be claimed",
                name
            )));
        }

        let _guard = state.locks.acquire(&name).await;
        let mut tx = state.begin_write().await?;

        let user = Self::get_user(&mut tx, user_id).await?;
        let existing = PantryRepository::find_by_name(&mut tx, &name).await?;

        if let (Some(current), Some(target)) = (&user.pantry_id, &existing) {
            if current != &target.id {
                return Err(AppError::Conflict(
                    "Leave your current pantry before joining another".to_string(),
                ));
            }
        }
        if user.pantry_id.is_some() && existing.is_none() {
            return Err(AppError::Conflict(
                "Leave your current pantry before creating another".to_string(),
            ));
        }

        let (pantry, is_new_pantry) = match existing {
            None => {
                let pantry = PantryRepository::create(&mut tx, &name, Some(&user.id)).await?;
                (pantry, true)
            }
            Some(pantry) => match pantry.owner_id.clone().as_deref() {
                Some(owner) if owner == user.id => (pantry, false),
                Some(_) if user.belongs_to(&pantry.id) => (pantry, false),
                Some(_) => {
                    return Err(AppError::Conflict(format!(
                        "Pantry '{}' already has an owner; send a join request instead",
                        name
                    )));
                }
                None => {
                    let pantry = PantryRepository::set_owner(&mut tx, &pantry.id, Some(&user.id)).await?;
                    (pantry, true)
                }
            },
        };

        let already_member = user.belongs_to(&pantry.id);
        if !already_member {
            UserRepository::set_pantry(
                &mut tx,
                &user.id,
                Some(&pantry.id),
                Some(Utc::now().naive_utc()),
            )
            .await?;
        }

        let data = json!({ "pantryName": pantry.name });
        if is_new_pantry {
            ActivityService::record_quietly(
                &mut tx,
                &state.config.activity,
                &pantry.id,
                &user,
                PANTRY_CREATED,
                data.clone(),
            )
            .await;
        }
        if !already_member {
            ActivityService::record_quietly(
                &mut tx,
                &state.config.activity,
                &pantry.id,
                &user,
                MEMBER_JOINED,
                data,
            )
            .await;
        }

        tx.commit().await?;

        if is_new_pantry {
            tracing::info!("User {} claimed pantry '{}'", user.id, pantry.name);
        } else if !already_member {
            tracing::info!("Owner {} rejoined pantry '{}'", user.id, pantry.name);
        }

        Ok(AssignOutcome {
            pantry,
            is_new_pantry,
        })
    }

    /// Take the caller out of their pantry. An owner hands ownership to the
    /// longest-standing remaining member; with nobody left the pantry is ownerless.
    pub async fn leave_pantry(state: &Arc<AppState>, user_id: &str) -> AppResult<LeaveOutcome> {
        let pantry = {
            let mut conn = state.db.acquire().await?;
            let user = Self::get_user(&mut conn, user_id).await?;
            let Some(pantry_id) = user.pantry_id else {
                return Ok(LeaveOutcome::default());
            };
            PantryRepository::find_by_id(&mut conn, &pantry_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Pantry {}", pantry_id)))?
        };

        let _guard = state.locks.acquire(&pantry.name).await;
        let mut tx = state.begin_write().await?;

        let user = Self::get_user(&mut tx, user_id).await?;
        if !user.belongs_to(&pantry.id) {
            return Err(AppError::Conflict(
                "Pantry membership changed, please retry".to_string(),
            ));
        }

        UserRepository::set_pantry(&mut tx, &user.id, None, None).await?;
        ActivityService::record_quietly(
            &mut tx,
            &state.config.activity,
            &pantry.id,
            &user,
            MEMBER_LEFT,
            json!({ "pantryName": pantry.name }),
        )
        .await;

        let mut new_owner_id = None;
        if pantry.is_owned_by(&user.id) {
            let remaining = UserRepository::list_members(&mut tx, &pantry.id).await?;
            let successor = remaining.into_iter().next();
            PantryRepository::set_owner(&mut tx, &pantry.id, successor.as_ref().map(|u| u.id.as_str()))
                .await?;

            match &successor {
                Some(next) => {
                    ActivityService::record_quietly(
                        &mut tx,
                        &state.config.activity,
                        &pantry.id,
                        next,
                        OWNERSHIP_TRANSFERRED,
                        json!({ "pantryName": pantry.name, "previousOwner": user.id }),
                    )
                    .await;
                    tracing::info!(
                        "Ownership of pantry '{}' passed from {} to {}",
                        pantry.name,
                        user.id,
                        next.id
                    );
                }
                None => tracing::info!("Pantry '{}' is now ownerless", pantry.name),
            }
            new_owner_id = successor.map(|u| u.id);
        }

        tx.commit().await?;
        tracing::info!("User {} left pantry '{}'", user.id, pantry.name);

        Ok(LeaveOutcome {
            left_pantry: Some(pantry.name),
            new_owner_id,
        })
    }

    /// Owner-only. Evicts every member; items, requests and activity go with the pantry.
    pub async fn delete_pantry(state: &Arc<AppState>, user_id: &str) -> AppResult<u64> {
        let pantry = {
            let mut conn = state.db.acquire().await?;
            let user = Self::get_user(&mut conn, user_id).await?;
            let pantry_id = user
                .pantry_id
                .ok_or_else(|| AppError::NotFound("You are not in a pantry".to_string()))?;
            PantryRepository::find_by_id(&mut conn, &pantry_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Pantry {}", pantry_id)))?
        };

        if is_reserved(&state.config, &pantry.name) {
            return Err(AppError::Forbidden(
                "The default pantry cannot be deleted".to_string(),
            ));
        }

        let _guard = state.locks.acquire(&pantry.name).await;
        let mut tx = state.begin_write().await?;

        let user = Self::get_user(&mut tx, user_id).await?;
        if !user.belongs_to(&pantry.id) {
            return Err(AppError::Conflict(
                "Pantry membership changed, please retry".to_string(),
            ));
        }
        let pantry = PantryRepository::find_by_id(&mut tx, &pantry.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pantry {}", pantry.id)))?;
        if !pantry.is_owned_by(&user.id) {
            return Err(AppError::Forbidden(
                "Only the pantry owner can delete it".to_string(),
            ));
        }

        let evicted = UserRepository::clear_pantry(&mut tx, &pantry.id).await?;
        PantryRepository::delete(&mut tx, &pantry.id).await?;
        tx.commit().await?;

        tracing::info!(
            "Pantry '{}' deleted by {} ({} members evicted)",
            pantry.name,
            user.id,
            evicted
        );
        Ok(evicted)
    }

    pub async fn pantry_info(state: &Arc<AppState>, user_id: &str) -> AppResult<Option<PantryInfo>> {
        let mut conn = state.db.acquire().await?;
        let user = Self::get_user(&mut conn, user_id).await?;
        let Some(pantry_id) = &user.pantry_id else {
            return Ok(None);
        };
        let Some(pantry) = PantryRepository::find_by_id(&mut conn, pantry_id).await? else {
            return Ok(None);
        };
        let member_count = UserRepository::count_members(&mut conn, &pantry.id).await?;

        Ok(Some(PantryInfo {
            is_owner: pantry.is_owned_by(&user.id),
            id: pantry.id,
            name: pantry.name,
            owner_id: pantry.owner_id,
            member_count,
            created_at: pantry.created_at,
        }))
    }

    pub async fn members(state: &Arc<AppState>, pantry_name: &str) -> AppResult<Vec<Member>> {
        let name = normalize_pantry_name(pantry_name)?;
        let mut conn = state.db.acquire().await?;
        let pantry = PantryRepository::find_by_name(&mut conn, &name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pantry '{}'", name)))?;

        let members = UserRepository::list_members(&mut conn, &pantry.id).await?;
        Ok(members
            .into_iter()
            .map(|u| Member {
                is_owner: pantry.is_owned_by(&u.id),
                id: u.id,
                display_name: u.display_name,
                joined_at: u.joined_pantry_at,
            })
            .collect())
    }
}

pub fn normalize_pantry_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Pantry name is required".to_string()));
    }
    if name.chars().count() > MAX_PANTRY_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Pantry name cannot exceed {} characters",
            MAX_PANTRY_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn is_reserved(config: &Config, name: &str) -> bool {
    name.eq_ignore_ascii_case(&config.pantry.default_pantry_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ActivityRepository;
    use crate::test_support;

    async fn owner_of(state: &Arc<AppState>, name: &str) -> Option<String> {
        let mut conn = state.db.acquire().await.unwrap();
        PantryRepository::find_by_name(&mut conn, name)
            .await
            .unwrap()
            .and_then(|p| p.owner_id)
    }

    #[tokio::test]
    async fn assigning_twice_creates_one_ownership() {
        let state = test_support::state().await;
        test_support::user(&state, "ana@example.com", "Ana").await;

        let first = MembershipService::assign_pantry(&state, "ana@example.com", " Kitchen42 ")
            .await
            .unwrap();
        let second = MembershipService::assign_pantry(&state, "ana@example.com", "Kitchen42")
            .await
            .unwrap();

        assert!(first.is_new_pantry);
        assert!(!second.is_new_pantry);
        assert_eq!(first.pantry.id, second.pantry.id);
        assert_eq!(first.pantry.name, "Kitchen42");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pantries WHERE owner_id IS NOT NULL")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn owned_name_cannot_be_claimed_by_others() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        test_support::user(&state, "ben@example.com", "Ben").await;

        let err = MembershipService::assign_pantry(&state, "ben@example.com", "Kitchen42")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(owner_of(&state, "Kitchen42").await.as_deref(), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn rejects_reserved_empty_and_unknown() {
        let state = test_support::state().await;
        test_support::user(&state, "ana@example.com", "Ana").await;

        let err = MembershipService::assign_pantry(&state, "ana@example.com", "Default")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = MembershipService::assign_pantry(&state, "ana@example.com", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = MembershipService::assign_pantry(&state, "ghost@example.com", "Attic")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn owner_leaving_hands_over_to_earliest_member() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        test_support::member_of(&state, "ben@example.com", "Ben", "Kitchen42").await;
        test_support::member_of(&state, "cai@example.com", "Cai", "Kitchen42").await;

        let outcome = MembershipService::leave_pantry(&state, "ana@example.com").await.unwrap();
        assert_eq!(outcome.left_pantry.as_deref(), Some("Kitchen42"));
        assert_eq!(outcome.new_owner_id.as_deref(), Some("ben@example.com"));
        assert_eq!(owner_of(&state, "Kitchen42").await.as_deref(), Some("ben@example.com"));

        let members = MembershipService::members(&state, "Kitchen42").await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().any(|m| m.id == "ben@example.com" && m.is_owner));
        assert!(members.iter().all(|m| m.id != "ana@example.com"));
    }

    #[tokio::test]
    async fn last_member_leaving_makes_pantry_claimable() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        test_support::user(&state, "ben@example.com", "Ben").await;

        let outcome = MembershipService::leave_pantry(&state, "ana@example.com").await.unwrap();
        assert!(outcome.new_owner_id.is_none());
        assert!(owner_of(&state, "Kitchen42").await.is_none());

        let claimed = MembershipService::assign_pantry(&state, "ben@example.com", "Kitchen42")
            .await
            .unwrap();
        assert!(claimed.is_new_pantry);
        assert_eq!(owner_of(&state, "Kitchen42").await.as_deref(), Some("ben@example.com"));

        // leaving twice is a no-op
        let again = MembershipService::leave_pantry(&state, "ana@example.com").await.unwrap();
        assert!(again.left_pantry.is_none());
    }

    #[tokio::test]
    async fn only_owner_deletes_and_members_are_evicted() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;
        test_support::member_of(&state, "ben@example.com", "Ben", "Kitchen42").await;

        let err = MembershipService::delete_pantry(&state, "ben@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let evicted = MembershipService::delete_pantry(&state, "ana@example.com").await.unwrap();
        assert_eq!(evicted, 2);

        assert!(MembershipService::pantry_info(&state, "ben@example.com").await.unwrap().is_none());
        let err = MembershipService::members(&state, "Kitchen42").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn pantry_info_and_membership_events() {
        let state = test_support::state().await;
        test_support::user_in_pantry(&state, "ana@example.com", "Ana", "Kitchen42").await;

        let info = MembershipService::pantry_info(&state, "ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(info.is_owner);
        assert_eq!(info.member_count, 1);

        let mut conn = state.db.acquire().await.unwrap();
        let feed = ActivityRepository::recent(&mut conn, &info.id, 10).await.unwrap();
        let kinds: Vec<&str> = feed.iter().map(|r| r.activity_type.as_str()).collect();
        assert_eq!(kinds, vec![MEMBER_JOINED, PANTRY_CREATED]);
    }

    #[tokio::test]
    async fn callers_without_pantry_share_the_default() {
        let state = test_support::state().await;
        let ana = test_support::user(&state, "ana@example.com", "Ana").await;
        let ben = test_support::user(&state, "ben@example.com", "Ben").await;

        let mut conn = state.db.acquire().await.unwrap();
        let a = MembershipService::resolve_inventory_pantry(&mut conn, &state.config, &ana)
            .await
            .unwrap();
        let b = MembershipService::resolve_inventory_pantry(&mut conn, &state.config, &ben)
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "default");
        assert!(a.owner_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_first_claims_leave_one_owner() {
        let (state, _dir) = test_support::file_state().await;
        let racers: Vec<String> = (0..6).map(|i| format!("racer{}@example.com", i)).collect();
        for racer in &racers {
            test_support::user(&state, racer, "Racer").await;
        }

        let mut tasks = Vec::new();
        for racer in racers.clone() {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                MembershipService::assign_pantry(&state, &racer, "Kitchen42").await
            }));
        }

        let mut claimed = 0;
        let mut refused = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(outcome) => {
                    assert!(outcome.is_new_pantry);
                    claimed += 1;
                }
                Err(AppError::Conflict(_)) => refused += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!((claimed, refused), (1, racers.len() - 1));

        let owner = owner_of(&state, "Kitchen42").await.unwrap();
        assert!(racers.contains(&owner));
        let members = MembershipService::members(&state, "Kitchen42").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, owner);
    }
}
