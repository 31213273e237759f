//! Fixtures shared by the service and route tests.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{PantryRepository, User, UserRepository, WriteGate};
use crate::inventory_rules::InventoryRules;
use crate::locks::PantryLocks;
use crate::services::init::init_db;
use crate::services::membership::MembershipService;
use crate::AppState;

pub async fn state() -> Arc<AppState> {
    state_with(|_| {}).await
}

/// In-memory database with migrations applied, on a single connection.
pub async fn state_with(tweak: impl FnOnce(&mut Config)) -> Arc<AppState> {
    let mut config = test_config();
    config.database.url = "sqlite::memory:".to_string();
    tweak(&mut config);
    build(config).await
}

/// File-backed database on a full pool, for tests that need real
/// concurrency. Keep the directory alive for as long as the state.
pub async fn file_state() -> (Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.database.url = format!("sqlite://{}", dir.path().join("pantry.db").display());
    (build(config).await, dir)
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config
}

async fn build(config: Config) -> Arc<AppState> {
    let pool = init_db(&config).await.unwrap();
    Arc::new(AppState {
        db: pool,
        writes: WriteGate::new(),
        config,
        rules: InventoryRules::embedded().unwrap(),
        locks: PantryLocks::new(),
    })
}

pub async fn user(state: &Arc<AppState>, email: &str, name: &str) -> User {
    let mut tx = state.begin_write().await.unwrap();
    let user = UserRepository::create(&mut tx, email, "not-a-real-hash", name)
        .await
        .unwrap()
        .unwrap();
    tx.commit().await.unwrap();
    user
}

/// New user who claims (or re-enters) `pantry`.
pub async fn user_in_pantry(state: &Arc<AppState>, email: &str, name: &str, pantry: &str) -> User {
    user(state, email, name).await;
    MembershipService::assign_pantry(state, email, pantry)
        .await
        .unwrap();
    let mut conn = state.db.acquire().await.unwrap();
    UserRepository::find_by_id(&mut conn, email).await.unwrap().unwrap()
}

/// New user placed straight into an existing pantry, bypassing the join workflow.
pub async fn member_of(state: &Arc<AppState>, email: &str, name: &str, pantry: &str) -> User {
    user(state, email, name).await;
    let mut tx = state.begin_write().await.unwrap();
    let pantry = PantryRepository::find_by_name(&mut tx, pantry)
        .await
        .unwrap()
        .unwrap();
    UserRepository::set_pantry(&mut tx, email, Some(&pantry.id), Some(Utc::now().naive_utc()))
        .await
        .unwrap();
    let user = UserRepository::find_by_id(&mut tx, email).await.unwrap().unwrap();
    tx.commit().await.unwrap();
    user
}
