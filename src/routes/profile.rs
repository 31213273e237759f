use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::db::UpdateProfile;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::extract::AppJson;
use crate::services::auth::{AuthService, ProfileView};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_profile).put(update_profile))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ProfileView>> {
    Ok(Json(AuthService::profile(&state, &user.id).await?))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<UpdateProfile>,
) -> AppResult<Json<ProfileView>> {
    Ok(Json(AuthService::update_profile(&state, &user.id, body).await?))
}
