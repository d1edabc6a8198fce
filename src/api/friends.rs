//! Friend endpoints
//!
//! Friend-request lifecycle plus friend and request listings.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::Deserialize;

use super::dto::FriendResponse;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::EdgeWithUser;

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
    pub username: String,
}

/// Create friends router
pub fn friends_router() -> Router<AppState> {
    Router::new()
        .route("/friends", get(get_friends))
        .route("/friends/request", post(send_request))
        .route("/friends/requests", get(get_requests))
        .route("/friends/requests/sent", get(get_sent_requests))
        .route("/friends/:id/accept", post(accept))
        .route("/friends/:id/reject", post(reject))
        .route("/friends/cancel/:target_id", delete(cancel))
        .route("/friends/unfriend/:friend_id", delete(unfriend))
}

fn to_responses(edges: Vec<EdgeWithUser>) -> Vec<FriendResponse> {
    edges
        .iter()
        .map(|item| FriendResponse::new(&item.edge, &item.user))
        .collect()
}

/// POST /api/friends/request
async fn send_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<FriendRequestBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let edge = state.friendships.send_request(&user.id, &body.username).await?;
    Ok(Json(serde_json::json!({ "requestId": edge.id })))
}

/// POST /api/friends/:id/accept
async fn accept(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.friendships.accept(&id, &user.id).await?;
    Ok(Json(serde_json::json!({})))
}

/// POST /api/friends/:id/reject
async fn reject(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.friendships.reject(&id, &user.id).await?;
    Ok(Json(serde_json::json!({})))
}

/// DELETE /api/friends/cancel/:target_id
async fn cancel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(target_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.friendships.cancel(&user.id, &target_id).await?;
    Ok(Json(serde_json::json!({})))
}

/// DELETE /api/friends/unfriend/:friend_id
async fn unfriend(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(friend_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.friendships.unfriend(&user.id, &friend_id).await?;
    Ok(Json(serde_json::json!({})))
}

/// GET /api/friends
async fn get_friends(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<FriendResponse>>, AppError> {
    let friends = state.friendships.list_friends(&user.id).await?;
    Ok(Json(to_responses(friends)))
}

/// GET /api/friends/requests
async fn get_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<FriendResponse>>, AppError> {
    let requests = state.friendships.list_pending_received(&user.id).await?;
    Ok(Json(to_responses(requests)))
}

/// GET /api/friends/requests/sent
async fn get_sent_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<FriendResponse>>, AppError> {
    let requests = state.friendships.list_pending_sent(&user.id).await?;
    Ok(Json(to_responses(requests)))
}
