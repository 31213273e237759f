use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Activity types emitted by the service itself. Clients may record others.
pub mod activity_types {
    pub const PANTRY_CREATED: &str = "pantry_created";
    pub const MEMBER_JOINED: &str = "member_joined";
    pub const MEMBER_LEFT: &str = "member_left";
    pub const OWNERSHIP_TRANSFERRED: &str = "ownership_transferred";
    pub const JOIN_REQUESTED: &str = "join_requested";
    pub const JOIN_REJECTED: &str = "join_rejected";
    pub const ITEM_ADDED: &str = "item_added";
    pub const ITEM_MERGED: &str = "item_merged";
    pub const ITEM_REMOVED: &str = "item_removed";
    pub const SHOPPING_ADDED: &str = "shopping_added";
    pub const SHOPPING_REMOVED: &str = "shopping_removed";
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub pantry_id: String,
    pub user_id: String,
    pub user_name: String,
    pub activity_type: String,
    /// JSON object
    pub activity_data: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

impl ActivityRecord {
    pub fn data(&self) -> serde_json::Value {
        serde_json::from_str(&self.activity_data).unwrap_or(serde_json::Value::Null)
    }

    pub fn item_name(&self) -> Option<String> {
        item_name_of(&self.data())
    }
}

/// Item name carried by an activity payload (`itemName`, falling back to `name`).
pub fn item_name_of(data: &serde_json::Value) -> Option<String> {
    data.get("itemName")
        .or_else(|| data.get("name"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivity {
    pub pantry_id: String,
    pub user_id: String,
    pub user_name: String,
    pub activity_type: String,
    pub activity_data: serde_json::Value,
    pub description: String,
}
