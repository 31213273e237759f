use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::{PantryRepository, UpdateProfile, User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::services::membership::MembershipService;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_EMAIL_LEN: usize = 254;
const MAX_DISPLAY_NAME_LEN: usize = 80;
const MAX_TAGS: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub email: String,
    pub display_name: String,
    pub pantry_name: Option<String>,
    pub dietary_tags: Vec<String>,
    pub cuisine_tags: Vec<String>,
    pub created_at: NaiveDateTime,
}

pub struct AuthService;

impl AuthService {
    /// Lowercase and sanity-check an email used as a user id.
    pub fn normalize_email(raw: &str) -> AppResult<String> {
        let email = raw.trim().to_lowercase();
        let valid = email.len() <= MAX_EMAIL_LEN
            && !email.chars().any(char::is_whitespace)
            && match email.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && !domain.contains('@')
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                }
                None => false,
            };
        if !valid {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        Ok(email)
    }

    pub async fn signup(
        state: &Arc<AppState>,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AppResult<ProfileView> {
        let email = Self::normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let display_name = match display_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => validate_display_name(name)?,
            None => email.split('@').next().unwrap_or_default().to_string(),
        };

        {
            let mut conn = state.db.acquire().await?;
            if UserRepository::find_by_id(&mut conn, &email).await?.is_some() {
                return Err(AppError::Conflict("An account with this email already exists".to_string()));
            }
        }

        let password = password.to_string();
        let cost = state.config.auth.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {}", e)))?;

        // The early check above is only a fast path; the insert decides
        let mut tx = state.begin_write().await?;
        let user = UserRepository::create(&mut tx, &email, &password_hash, &display_name)
            .await?
            .ok_or_else(|| AppError::Conflict("An account with this email already exists".to_string()))?;
        tx.commit().await?;
        tracing::info!("New account created: {}", user.id);

        let mut conn = state.db.acquire().await?;
        Self::view(&mut conn, user).await
    }

    pub async fn signin(state: &Arc<AppState>, email: &str, password: &str) -> AppResult<ProfileView> {
        let email = Self::normalize_email(email).map_err(|_| AppError::Unauthorized)?;

        let user = {
            let mut conn = state.db.acquire().await?;
            UserRepository::find_by_id(&mut conn, &email)
                .await?
                .ok_or(AppError::Unauthorized)?
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("verification task failed: {}", e)))?
            .unwrap_or_else(|e| {
                tracing::warn!("Stored password hash for {} is unreadable: {}", user.id, e);
                false
            });

        if !matches {
            tracing::debug!("Failed sign-in for {}", user.id);
            return Err(AppError::Unauthorized);
        }

        let mut conn = state.db.acquire().await?;
        Self::view(&mut conn, user).await
    }

    pub async fn profile(state: &Arc<AppState>, user_id: &str) -> AppResult<ProfileView> {
        let mut conn = state.db.acquire().await?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;
        Self::view(&mut conn, user).await
    }

    pub async fn update_profile(
        state: &Arc<AppState>,
        user_id: &str,
        update: UpdateProfile,
    ) -> AppResult<ProfileView> {
        let display_name = update
            .display_name
            .as_deref()
            .map(validate_display_name)
            .transpose()?;
        let dietary = update.dietary_tags.map(clean_tags).transpose()?;
        let cuisine = update.cuisine_tags.map(clean_tags).transpose()?;

        let mut tx = state.begin_write().await?;
        MembershipService::get_user(&mut tx, user_id).await?;
        let user = UserRepository::update_profile(
            &mut tx,
            user_id,
            display_name.as_deref(),
            dietary.as_deref(),
            cuisine.as_deref(),
        )
        .await?;
        tx.commit().await?;

        let mut conn = state.db.acquire().await?;
        Self::view(&mut conn, user).await
    }

    async fn view(conn: &mut SqliteConnection, user: User) -> AppResult<ProfileView> {
        let pantry_name = match &user.pantry_id {
            Some(id) => PantryRepository::find_by_id(conn, id).await?.map(|p| p.name),
            None => None,
        };

        Ok(ProfileView {
            dietary_tags: user.dietary_tags(),
            cuisine_tags: user.cuisine_tags(),
            email: user.id,
            display_name: user.display_name,
            pantry_name,
            created_at: user.created_at,
        })
    }
}

fn validate_display_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Display name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Display name cannot exceed {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Trim, drop blanks and case-insensitive repeats, then encode as a JSON array.
fn clean_tags(tags: Vec<String>) -> AppResult<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    }
    if out.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "At most {} tags are allowed",
            MAX_TAGS
        )));
    }
    serde_json::to_string(&out).map_err(|e| AppError::Internal(e.into()))
}
