use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Lowercased email address.
    pub id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub pantry_id: Option<String>,
    pub joined_pantry_at: Option<NaiveDateTime>,

    // Tag lists are stored as JSON arrays
    #[sqlx(rename = "dietary_tags")]
    pub dietary_tags_json: String,
    #[sqlx(rename = "cuisine_tags")]
    pub cuisine_tags_json: String,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn dietary_tags(&self) -> Vec<String> {
        parse_tags(&self.dietary_tags_json)
    }

    pub fn cuisine_tags(&self) -> Vec<String> {
        parse_tags(&self.cuisine_tags_json)
    }

    pub fn belongs_to(&self, pantry_id: &str) -> bool {
        self.pantry_id.as_deref() == Some(pantry_id)
    }
}

fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed tag list {:?}: {}", raw, e);
        Vec::new()
    })
}

/// Profile fields a user may change. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub dietary_tags: Option<Vec<String>>,
    pub cuisine_tags: Option<Vec<String>>,
}
