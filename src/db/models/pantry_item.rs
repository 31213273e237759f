use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PantryItem {
    pub id: String,
    pub pantry_id: String,
    /// Display name as first submitted.
    pub name: String,
    /// Lowercased, trimmed name used for consolidation.
    pub normalized_name: String,
    /// Decimal quantity kept as text, e.g. "5" or "2.5".
    pub amount: String,
    pub measurement: String,
    pub category: String,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PantryItem {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map_or(false, |d| d < today)
    }
}

#[derive(Debug, Clone)]
pub struct NewPantryItem {
    pub pantry_id: String,
    pub name: String,
    pub normalized_name: String,
    pub amount: String,
    pub measurement: String,
    pub category: String,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

/// Fields rewritten when a submission is consolidated into an existing row.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedPantryItem {
    pub amount: String,
    pub category: String,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}
