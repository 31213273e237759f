use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Pantry Item Repository
// ============================================================================

pub struct PantryItemRepository;

impl PantryItemRepository {
    /// Inventory of one pantry in insertion order.
    pub async fn list(conn: &mut SqliteConnection, pantry_id: &str) -> AppResult<Vec<PantryItem>> {
        sqlx::query_as::<_, PantryItem>(
            r#"
            SELECT * FROM pantry_items
            WHERE pantry_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(pantry_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Look up the row sharing a consolidation key, if any.
    pub async fn find_by_key(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        normalized_name: &str,
        measurement: &str,
    ) -> AppResult<Option<PantryItem>> {
        sqlx::query_as::<_, PantryItem>(
            r#"
            SELECT * FROM pantry_items
            WHERE pantry_id = ? AND normalized_name = ? AND measurement = ?
            "#,
        )
        .bind(pantry_id)
        .bind(normalized_name)
        .bind(measurement)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn insert(conn: &mut SqliteConnection, item: NewPantryItem) -> AppResult<PantryItem> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, PantryItem>(
            r#"
            INSERT INTO pantry_items (
                id, pantry_id, name, normalized_name, amount, measurement,
                category, purchase_date, expiry_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(item.pantry_id)
        .bind(item.name)
        .bind(item.normalized_name)
        .bind(item.amount)
        .bind(item.measurement)
        .bind(item.category)
        .bind(item.purchase_date)
        .bind(item.expiry_date)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn apply_merge(
        conn: &mut SqliteConnection,
        item_id: &str,
        merged: &MergedPantryItem,
    ) -> AppResult<PantryItem> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, PantryItem>(
            r#"
            UPDATE pantry_items
            SET amount = ?, category = ?, purchase_date = ?, expiry_date = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&merged.amount)
        .bind(&merged.category)
        .bind(merged.purchase_date)
        .bind(merged.expiry_date)
        .bind(now)
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Remove an item from a pantry, returning it when it existed.
    pub async fn delete(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        item_id: &str,
    ) -> AppResult<Option<PantryItem>> {
        sqlx::query_as::<_, PantryItem>(
            "DELETE FROM pantry_items WHERE pantry_id = ? AND id = ? RETURNING *",
        )
        .bind(pantry_id)
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
    }
}
