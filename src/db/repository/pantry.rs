use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::models::Pantry;
use crate::error::{AppError, AppResult};

// ============================================================================
// Pantry Repository (also the ownership registry)
// ============================================================================

pub struct PantryRepository;

impl PantryRepository {
    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> AppResult<Option<Pantry>> {
        sqlx::query_as::<_, Pantry>("SELECT * FROM pantries WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> AppResult<Option<Pantry>> {
        sqlx::query_as::<_, Pantry>("SELECT * FROM pantries WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AppError::Database)
    }

    pub async fn create(
        conn: &mut SqliteConnection,
        name: &str,
        owner_id: Option<&str>,
    ) -> AppResult<Pantry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, Pantry>(
            r#"
            INSERT INTO pantries (id, name, owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Fetch a pantry by name, creating it ownerless if it does not exist yet.
    pub async fn ensure(conn: &mut SqliteConnection, name: &str) -> AppResult<Pantry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO pantries (id, name, owner_id, created_at, updated_at)
            VALUES (?, ?, NULL, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_name(conn, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pantry '{}' not found", name)))
    }

    pub async fn set_owner(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        owner_id: Option<&str>,
    ) -> AppResult<Pantry> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, Pantry>(
            r#"
            UPDATE pantries
            SET owner_id = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(now)
        .bind(pantry_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Delete a pantry. Items, requests and activity go with it (ON DELETE CASCADE).
    pub async fn delete(conn: &mut SqliteConnection, pantry_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM pantries WHERE id = ?")
            .bind(pantry_id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }
}
