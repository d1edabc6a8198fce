//! Notification endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use super::dto::NotificationResponse;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// Create notifications router
pub fn notifications_router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(get_notifications))
        .route("/notifications/unread", get(get_unread))
        .route("/notifications/:id/read", post(mark_read))
}

/// GET /api/notifications
async fn get_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let notifications = state.notifications.list_all(&user.id).await?;
    Ok(Json(
        notifications.iter().map(NotificationResponse::from).collect(),
    ))
}

/// GET /api/notifications/unread
async fn get_unread(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let notifications = state.notifications.list_unread(&user.id).await?;
    Ok(Json(
        notifications.iter().map(NotificationResponse::from).collect(),
    ))
}

/// POST /api/notifications/:id/read
async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.notifications.mark_read(&user.id, &id).await?;
    Ok(Json(serde_json::json!({})))
}
