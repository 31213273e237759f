use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::extract::AppJson;
use crate::services::inventory::{AddOutcome, InventoryService, ItemCandidate, ItemView};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_items).post(add_item))
        .route("/batch", post(add_batch))
        .route("/names", get(names))
        .route("/:id", delete(delete_item))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<ItemCandidate>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub items: Vec<AddOutcome>,
}

#[derive(Debug, Serialize)]
pub struct NamesResponse {
    pub names: Vec<String>,
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<ItemView>>> {
    Ok(Json(InventoryService::list_items(&state, &user.id).await?))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<ItemCandidate>,
) -> AppResult<(StatusCode, Json<AddOutcome>)> {
    let outcome = InventoryService::add_item(&state, &user.id, body).await?;
    let status = if outcome.merged {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

async fn add_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<BatchRequest>,
) -> AppResult<Json<BatchResponse>> {
    let items = InventoryService::add_items(&state, &user.id, body.items).await?;
    Ok(Json(BatchResponse { items }))
}

async fn names(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<NamesResponse>> {
    let names = InventoryService::ingredient_names(&state, &user.id).await?;
    Ok(Json(NamesResponse { names }))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ItemView>> {
    Ok(Json(InventoryService::delete_item(&state, &user.id, &id).await?))
}
