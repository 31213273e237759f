use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::db::{User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::routes::extract::AppJson;
use crate::services::auth::{AuthService, ProfileView};
use crate::AppState;

/// Header carrying the caller's email.
pub const USER_HEADER: &str = "x-user-email";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn signup(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<ProfileView>)> {
    let profile =
        AuthService::signup(&state, &body.email, &body.password, body.display_name.as_deref())
            .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn signin(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<SigninRequest>,
) -> AppResult<Json<ProfileView>> {
    let profile = AuthService::signin(&state, &body.email, &body.password).await?;
    Ok(Json(profile))
}

// ============================================================================
// Caller identity
// ============================================================================

/// The calling user, resolved from the `X-User-Email` header.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or unreadable {} header", USER_HEADER);
                AppError::Unauthorized
            })?;

        let email = AuthService::normalize_email(raw).map_err(|_| AppError::Unauthorized)?;

        let mut conn = state.db.acquire().await?;
        let user = UserRepository::find_by_id(&mut conn, &email)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Unknown caller {}", email);
                AppError::Unauthorized
            })?;

        Ok(AuthUser(user))
    }
}
