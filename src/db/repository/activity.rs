use chrono::NaiveDateTime;
use sqlx::SqliteConnection;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Activity Log Repository
// ============================================================================

pub struct ActivityRepository;

impl ActivityRepository {
    /// Newest records first.
    pub async fn recent(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        limit: i64,
    ) -> AppResult<Vec<ActivityRecord>> {
        sqlx::query_as::<_, ActivityRecord>(
            r#"
            SELECT * FROM activity_log
            WHERE pantry_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(pantry_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        activity: CreateActivity,
        created_at: NaiveDateTime,
    ) -> AppResult<ActivityRecord> {
        sqlx::query_as::<_, ActivityRecord>(
            r#"
            INSERT INTO activity_log (
                pantry_id, user_id, user_name, activity_type,
                activity_data, description, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(activity.pantry_id)
        .bind(activity.user_id)
        .bind(activity.user_name)
        .bind(activity.activity_type)
        .bind(activity.activity_data.to_string())
        .bind(activity.description)
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Keep only the newest `keep` records of a pantry.
    pub async fn prune(conn: &mut SqliteConnection, pantry_id: &str, keep: i64) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM activity_log
            WHERE pantry_id = ?
            AND id NOT IN (
                SELECT id FROM activity_log
                WHERE pantry_id = ?
                ORDER BY id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(pantry_id)
        .bind(pantry_id)
        .bind(keep)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
