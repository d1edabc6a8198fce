//! Chat endpoints
//!
//! Command endpoints (send, typing, mark read) plus conversation
//! queries and group creation.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;

use super::dto::{ConversationResponse, MessageResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::NotificationStyle;
use crate::error::AppError;
use crate::service::SendMessage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub conversation_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptRequest {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<String>,
    pub avatar_url: Option<String>,
}

/// Create chat router
pub fn chat_router() -> Router<AppState> {
    Router::new()
        .route("/chat/send", post(send_message))
        .route("/chat/typing", post(typing))
        .route("/chat/read", post(mark_read))
        .route("/conversations", get(get_conversations))
        .route("/conversations/:id/messages", get(get_messages))
        .route("/conversations/groups", post(create_group))
}

/// POST /api/chat/send
async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SendMessage>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.messaging.send(&user.id, request).await?;
    Ok(Json(MessageResponse::from(&message)))
}

/// POST /api/chat/typing
async fn typing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<TypingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .messaging
        .typing_event(&request.conversation_id, &user.id, request.is_typing)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// POST /api/chat/read
async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ReadReceiptRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state
        .messaging
        .mark_read(&request.conversation_id, &user.id)
        .await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// GET /api/conversations
async fn get_conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ConversationResponse>>, AppError> {
    let conversations = state.conversations.list_for_user(&user.id).await?;

    let mut responses = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        let participants = state.conversations.participants(&conversation.id).await?;
        responses.push(ConversationResponse::new(conversation, &participants));
    }

    Ok(Json(responses))
}

/// GET /api/conversations/:id/messages
async fn get_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    if !state.conversations.is_participant(&id, &user.id).await? {
        return Err(AppError::NotFound("Conversation not found".to_string()));
    }

    let messages = state.messaging.fetch_history(&id).await?;
    Ok(Json(messages.iter().map(MessageResponse::from).collect()))
}

/// POST /api/conversations/groups
async fn create_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateGroupRequest>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state
        .conversations
        .create_group(
            &user.id,
            &request.member_ids,
            &request.name,
            request.avatar_url,
        )
        .await?;

    // Members are notified after the group exists; a failed push must not
    // undo the creation.
    let mut member_ids: Vec<String> = request
        .member_ids
        .iter()
        .filter(|id| id.as_str() != user.id)
        .cloned()
        .collect();
    member_ids.sort();
    member_ids.dedup();
    if let Err(error) = state
        .notifications
        .emit_batch(
            &user.id,
            &member_ids,
            conversation.name.as_deref().unwrap_or_default(),
            NotificationStyle::GroupAdd,
        )
        .await
    {
        tracing::warn!(%error, "Failed to emit group notifications");
    }

    let participants = state.conversations.participants(&conversation.id).await?;
    Ok(Json(ConversationResponse::new(&conversation, &participants)))
}
