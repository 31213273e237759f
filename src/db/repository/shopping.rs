use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

pub struct ShoppingRepository;

impl ShoppingRepository {
    pub async fn list(conn: &mut SqliteConnection, pantry_id: &str) -> AppResult<Vec<ShoppingItem>> {
        sqlx::query_as::<_, ShoppingItem>(
            r#"
            SELECT * FROM shopping_items
            WHERE pantry_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(pantry_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_key(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        normalized_name: &str,
        measurement: &str,
    ) -> AppResult<Option<ShoppingItem>> {
        sqlx::query_as::<_, ShoppingItem>(
            r#"
            SELECT * FROM shopping_items
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

    pub async fn insert(conn: &mut SqliteConnection, item: NewShoppingItem) -> AppResult<ShoppingItem> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, ShoppingItem>(
            r#"
            INSERT INTO shopping_items (
                id, pantry_id, name, normalized_name, amount, measurement,
                note, added_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(item.pantry_id)
        .bind(item.name)
        .bind(item.normalized_name)
        .bind(item.amount)
        .bind(item.measurement)
        .bind(item.note)
        .bind(item.added_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    /// Raise the amount of an existing entry; a new note replaces the old one.
    pub async fn top_up(
        conn: &mut SqliteConnection,
        item_id: &str,
        amount: &str,
        note: Option<&str>,
    ) -> AppResult<ShoppingItem> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, ShoppingItem>(
            r#"
            UPDATE shopping_items
            SET amount = ?, note = COALESCE(?, note), updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(note)
        .bind(now)
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        item_id: &str,
    ) -> AppResult<Option<ShoppingItem>> {
        sqlx::query_as::<_, ShoppingItem>(
            "DELETE FROM shopping_items WHERE pantry_id = ? AND id = ? RETURNING *",
        )
        .bind(pantry_id)
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)
    }
}
