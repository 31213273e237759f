use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: String,
    pub pantry_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub normalized_name: String,
    pub amount: String,
    pub measurement: String,
    pub note: Option<String>,
    /// Member who first put the entry on the list.
    pub added_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewShoppingItem {
    pub pantry_id: String,
    pub name: String,
    pub normalized_name: String,
    pub amount: String,
    pub measurement: String,
    pub note: Option<String>,
    pub added_by: String,
}
