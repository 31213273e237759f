use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::{JoinRequest, Vote};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::extract::AppJson;
use crate::services::join_requests::{JoinOutcome, JoinRequestService};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create))
        .route("/incoming", get(incoming))
        .route("/mine", get(mine))
        .route("/:id", get(get_request))
        .route("/:id/respond", post(respond))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub pantry_name: String,
    pub requester_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    /// "approve" or "reject"
    pub action: String,
}

async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<CreateRequest>,
) -> AppResult<(StatusCode, Json<JoinOutcome>)> {
    let outcome = JoinRequestService::create(
        &state,
        &user.id,
        &body.pantry_name,
        body.requester_name.as_deref(),
    )
    .await?;

    let status = match outcome {
        JoinOutcome::Admitted { .. } => StatusCode::OK,
        JoinOutcome::Pending { .. } => StatusCode::CREATED,
    };
    Ok((status, Json(outcome)))
}

async fn incoming(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<JoinRequest>>> {
    Ok(Json(JoinRequestService::pending_for_pantry(&state, &user.id).await?))
}

async fn mine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<JoinRequest>>> {
    Ok(Json(JoinRequestService::my_requests(&state, &user.id).await?))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<JoinRequest>> {
    Ok(Json(JoinRequestService::get(&state, &user.id, &id).await?))
}

async fn respond(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<RespondRequest>,
) -> AppResult<Json<JoinRequest>> {
    let vote = Vote::from_str(&body.action).ok_or_else(|| {
        AppError::Validation("action must be 'approve' or 'reject'".to_string())
    })?;
    Ok(Json(JoinRequestService::respond(&state, &id, &user.id, vote).await?))
}
