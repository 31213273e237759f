use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::ActivityRecord;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::extract::{AppJson, AppQuery};
use crate::services::activity::ActivityService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_activity).post(record_activity))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    pub activity_type: String,
    #[serde(default)]
    pub activity_data: serde_json::Value,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub id: i64,
    pub user_id: String,
    pub user_name: String,
    pub activity_type: String,
    pub activity_data: serde_json::Value,
    pub description: String,
    pub timestamp: NaiveDateTime,
}

impl From<ActivityRecord> for ActivityResponse {
    fn from(r: ActivityRecord) -> Self {
        Self {
            activity_data: r.data(),
            id: r.id,
            user_id: r.user_id,
            user_name: r.user_name,
            activity_type: r.activity_type,
            description: r.description,
            timestamp: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    /// False when the event was dropped as a duplicate.
    pub recorded: bool,
    pub activity: Option<ActivityResponse>,
}

async fn list_activity(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppQuery(query): AppQuery<ListQuery>,
) -> AppResult<Json<Vec<ActivityResponse>>> {
    let records = ActivityService::list(&state, &user.id, query.limit).await?;
    Ok(Json(records.into_iter().map(ActivityResponse::from).collect()))
}

async fn record_activity(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<RecordRequest>,
) -> AppResult<Json<RecordResponse>> {
    let record = ActivityService::record(
        &state,
        &user.id,
        &body.activity_type,
        body.activity_data,
        body.description,
    )
    .await?;

    Ok(Json(RecordResponse {
        recorded: record.is_some(),
        activity: record.map(ActivityResponse::from),
    }))
}
