//! User endpoints
//!
//! Profile access, username search with friendship state, and the
//! presence connect/disconnect commands.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::dto::{UserResponse, UserSearchResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::bus::channel;
use crate::data::UserStatus;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// Payload published on the per-user presence channel
#[derive(Debug, Clone, Serialize)]
struct PresenceEvent {
    event: &'static str,
    user_id: String,
    username: String,
    status: String,
}

/// Create users router
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).put(update_me))
        .route("/users/search", get(search))
        .route("/users/connect", post(connect))
        .route("/users/disconnect", post(disconnect))
}

/// GET /api/users/me
async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .db
        .get_user(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(UserResponse::from(&user)))
}

/// PUT /api/users/me
async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let mut user = state
        .db
        .get_user(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(full_name) = request.full_name {
        let full_name = full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(AppError::Validation(
                "Display name must not be empty".to_string(),
            ));
        }
        user.full_name = full_name;
    }
    if let Some(email) = request.email {
        user.email = Some(email);
    }
    if let Some(avatar_url) = request.avatar_url {
        user.avatar_url = Some(avatar_url);
    }
    if let Some(bio) = request.bio {
        user.bio = Some(bio);
    }

    state.db.update_user_profile(&user).await?;

    Ok(Json(UserResponse::from(&user)))
}

/// GET /api/users/search?username=...
///
/// Returns the target user plus the friendship state as seen from the
/// caller, including the pending edge id when one exists.
async fn search(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<UserSearchResponse>, AppError> {
    let target = state
        .db
        .get_user_by_username(params.username.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let friend_state = state.friendships.query_status(&me.id, &target.id).await?;

    Ok(Json(UserSearchResponse {
        user: UserResponse::from(&target),
        friend_status: friend_state.as_str().to_string(),
        request_id: friend_state.edge_id().map(ToOwned::to_owned),
    }))
}

/// POST /api/users/connect
async fn connect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    set_presence(&state, &user.id, UserStatus::Online).await
}

/// POST /api/users/disconnect
async fn disconnect(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    set_presence(&state, &user.id, UserStatus::Offline).await
}

async fn set_presence(
    state: &AppState,
    user_id: &str,
    status: UserStatus,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    state.db.set_user_status(&user.id, status).await?;

    let event = PresenceEvent {
        event: "presence",
        user_id: user.id.clone(),
        username: user.username.clone(),
        status: status.as_str().to_string(),
    };
    match serde_json::to_value(&event) {
        Ok(payload) => state
            .bus
            .publish(&channel::user_presence(&user.username), payload),
        Err(error) => tracing::warn!(%error, "Failed to serialize presence event"),
    }

    Ok(Json(serde_json::json!({ "status": status.as_str() })))
}
