//! Startup helpers: database pool + migrations, inventory rules.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::config::Config;
use crate::db::PantryRepository;
use crate::inventory_rules::InventoryRules;

/// File path behind a `sqlite://` URL, without connection parameters.
pub fn sqlite_path(db_url: &str) -> &str {
    let path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    path.split_once('?').map_or(path, |(path, _)| path)
}

fn is_in_memory(db_url: &str) -> bool {
    db_url.starts_with("sqlite::memory:") || sqlite_path(db_url) == ":memory:"
}

/// Open the SQLite pool, creating the file and its directory when missing,
/// apply the embedded migrations and make sure the default pantry exists.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    let in_memory = is_in_memory(db_url);

    let connect_options = if in_memory {
        tracing::info!("Connecting to in-memory database");
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        let db_path = sqlite_path(db_url);
        tracing::info!("Connecting to database: {}", db_path);

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
            }
        }

        // WAL keeps readers off the writer's lock
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
    };
    let connect_options = connect_options
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.database.busy_timeout_ms));

    let pool_options = if in_memory {
        // an in-memory database lives and dies with its single connection
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.database.max_connections)
    };
    let pool = pool_options.connect_with(connect_options).await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    let mut tx = pool.begin().await?;
    let default_pantry =
        PantryRepository::ensure(&mut tx, &config.pantry.default_pantry_name).await?;
    tx.commit().await?;
    tracing::info!("Default pantry '{}' ready", default_pantry.name);

    Ok(pool)
}

/// Category and expiry tables, from `INVENTORY_RULES_PATH` when set.
pub fn init_rules(config: &Config) -> Result<InventoryRules> {
    let rules = InventoryRules::load(config.pantry.inventory_rules_path.as_deref())?;
    tracing::info!(
        "Inventory rules ready: {} categories, {} expiry rules",
        rules.categories.len(),
        rules.expiry_rules.len()
    );
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_reduce_to_their_path() {
        assert_eq!(sqlite_path("sqlite://data/pantry.db"), "data/pantry.db");
        assert_eq!(sqlite_path("sqlite://data/pantry.db?mode=rwc"), "data/pantry.db");
        assert_eq!(sqlite_path("/var/lib/pantry.db"), "/var/lib/pantry.db");
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://:memory:"));
        assert!(!is_in_memory("sqlite://data/pantry.db"));
    }

    #[test]
    fn missing_rules_file_is_an_error() {
        let mut config = Config::default();
        config.pantry.inventory_rules_path = Some("/nonexistent/rules.json".to_string());
        assert!(init_rules(&config).is_err());

        config.pantry.inventory_rules_path = None;
        assert!(init_rules(&config).is_ok());
    }

    #[tokio::test]
    async fn in_memory_database_is_migrated() {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".to_string();
        let pool = init_db(&config).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'pantries', 'pantry_items')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 3);

        let default_pantries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pantries WHERE name = 'default'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(default_pantries, 1);
    }

    #[tokio::test]
    async fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.url = format!("sqlite://{}", dir.path().join("nested/pantry.db").display());

        let pool = init_db(&config).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        pool.close().await;
    }
}
