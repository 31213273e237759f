use chrono::{NaiveDateTime, Utc};
use sqlx::SqliteConnection;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AppError::Database)
    }

    /// Insert a new user. `None` means the id is already taken.
    pub async fn create(
        conn: &mut SqliteConnection,
        id: &str,
        password_hash: &str,
        display_name: &str,
    ) -> AppResult<Option<User>> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, password_hash, display_name, pantry_id, joined_pantry_at,
                dietary_tags, cuisine_tags, created_at, updated_at
            ) VALUES (?, ?, ?, NULL, NULL, '[]', '[]', ?, ?)
            ON CONFLICT(id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Point a user at a pantry (or none). `joined_at` is cleared with the pantry.
    pub async fn set_pantry(
        conn: &mut SqliteConnection,
        user_id: &str,
        pantry_id: Option<&str>,
        joined_at: Option<NaiveDateTime>,
    ) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            UPDATE users
            SET pantry_id = ?, joined_pantry_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(pantry_id)
        .bind(joined_at)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn update_profile(
        conn: &mut SqliteConnection,
        user_id: &str,
        display_name: Option<&str>,
        dietary_tags_json: Option<&str>,
        cuisine_tags_json: Option<&str>,
    ) -> AppResult<User> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                display_name = COALESCE(?, display_name),
                dietary_tags = COALESCE(?, dietary_tags),
                cuisine_tags = COALESCE(?, cuisine_tags),
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(display_name)
        .bind(dietary_tags_json)
        .bind(cuisine_tags_json)
        .bind(now)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Members of a pantry, longest-standing first.
    pub async fn list_members(conn: &mut SqliteConnection, pantry_id: &str) -> AppResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE pantry_id = ?
            ORDER BY joined_pantry_at ASC, id ASC
            "#,
        )
        .bind(pantry_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_members(conn: &mut SqliteConnection, pantry_id: &str) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE pantry_id = ?")
            .bind(pantry_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(AppError::Database)
    }

    /// Evict every member of a pantry. Returns how many users were affected.
    pub async fn clear_pantry(conn: &mut SqliteConnection, pantry_id: &str) -> AppResult<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET pantry_id = NULL, joined_pantry_at = NULL, updated_at = ?
            WHERE pantry_id = ?
            "#,
        )
        .bind(now)
        .bind(pantry_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
