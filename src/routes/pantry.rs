use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::extract::{AppJson, AppQuery};
use crate::services::membership::{AssignOutcome, LeaveOutcome, Member, MembershipService, PantryInfo};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_pantry).delete(delete_pantry))
        .route("/assign", post(assign))
        .route("/leave", post(leave))
        .route("/members", get(members))
        .nest("/items", crate::routes::items::router())
        .nest("/activity", crate::routes::activity::router())
        .nest("/shopping", crate::routes::shopping::router())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub pantry_name: String,
}

#[derive(Debug, Deserialize)]
pub struct MembersQuery {
    /// Defaults to the caller's pantry.
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PantryResponse {
    pub pantry: Option<PantryInfo>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub evicted: u64,
}

async fn get_pantry(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<PantryResponse>> {
    let pantry = MembershipService::pantry_info(&state, &user.id).await?;
    Ok(Json(PantryResponse { pantry }))
}

async fn delete_pantry(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<DeleteResponse>> {
    let evicted = MembershipService::delete_pantry(&state, &user.id).await?;
    Ok(Json(DeleteResponse { evicted }))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<AssignRequest>,
) -> AppResult<Json<AssignOutcome>> {
    let outcome = MembershipService::assign_pantry(&state, &user.id, &body.pantry_name).await?;
    Ok(Json(outcome))
}

async fn leave(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<LeaveOutcome>> {
    Ok(Json(MembershipService::leave_pantry(&state, &user.id).await?))
}

async fn members(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppQuery(query): AppQuery<MembersQuery>,
) -> AppResult<Json<Vec<Member>>> {
    let name = match query.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => MembershipService::pantry_info(&state, &user.id)
            .await?
            .map(|p| p.name)
            .ok_or_else(|| AppError::NotFound("You are not in a pantry".to_string()))?,
    };
    Ok(Json(MembershipService::members(&state, &name).await?))
}
