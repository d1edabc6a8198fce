//! Authentication
//!
//! Registration, login and token validation. The messaging core treats
//! identity as already resolved; this module is the thin boundary that
//! resolves it.

mod middleware;
mod session;

pub use middleware::{AuthUser, CurrentUser};
pub use session::{Claims, hash_password, issue_token, verify_password, verify_token};

use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;

use crate::AppState;
use crate::api::UserResponse;
use crate::data::{EntityId, User, UserStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Create authentication router
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let username = request.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }
    if request.password.len() < 6 {
        return Err(AppError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    if state.db.get_user_by_username(&username).await?.is_some() {
        return Err(AppError::Conflict("Username is already taken".to_string()));
    }

    let full_name = request.full_name.trim();
    let full_name = if full_name.is_empty() {
        username.clone()
    } else {
        full_name.to_string()
    };

    let now = chrono::Utc::now();
    let user = User {
        id: EntityId::new().0,
        username,
        password_hash: hash_password(request.password).await?,
        full_name,
        email: request.email,
        avatar_url: None,
        bio: None,
        status: UserStatus::Offline.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };

    state.db.insert_user(&user).await?;

    tracing::info!(username = %user.username, "User registered");

    let token = issue_token(
        &user.id,
        &user.username,
        &state.config.auth.token_secret,
        state.config.auth.token_max_age,
    )?;

    Ok(Json(serde_json::json!({
        "token": token,
        "user": UserResponse::from(&user),
    })))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = state
        .db
        .get_user_by_username(request.username.trim())
        .await?
        .ok_or(AppError::Unauthorized)?;

    let valid = verify_password(request.password, user.password_hash.clone()).await?;
    if !valid {
        return Err(AppError::Unauthorized);
    }

    let token = issue_token(
        &user.id,
        &user.username,
        &state.config.auth.token_secret,
        state.config.auth.token_max_age,
    )?;

    Ok(Json(serde_json::json!({
        "token": token,
        "user": UserResponse::from(&user),
    })))
}
