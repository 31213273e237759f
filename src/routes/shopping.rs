use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::db::ShoppingItem;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::extract::AppJson;
use crate::services::shopping::{ShoppingCandidate, ShoppingOutcome, ShoppingService, Suggestion};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list).post(add))
        .route("/suggestions", get(suggestions))
        .route("/:id", delete(remove))
}

async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<ShoppingItem>>> {
    Ok(Json(ShoppingService::list(&state, &user.id).await?))
}

async fn add(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<ShoppingCandidate>,
) -> AppResult<(StatusCode, Json<ShoppingOutcome>)> {
    let outcome = ShoppingService::add(&state, &user.id, body).await?;
    let status = if outcome.merged {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

async fn suggestions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Suggestion>>> {
    Ok(Json(ShoppingService::suggestions(&state, &user.id).await?))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ShoppingItem>> {
    Ok(Json(ShoppingService::remove(&state, &user.id, &id).await?))
}
