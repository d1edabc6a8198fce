//! HTTP API layer
//!
//! Thin handlers over the service layer. Request and response bodies use
//! camelCase field names to match the web client contract.

mod chat;
mod dto;
mod friends;
mod notifications;
mod streaming;
mod users;

pub use dto::{
    ConversationResponse, FriendResponse, MessageResponse, NotificationResponse, UserResponse,
    UserSearchResponse,
};

use axum::Router;

use crate::AppState;

/// Create the combined API router, nested under /api
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(chat::chat_router())
        .merge(friends::friends_router())
        .merge(notifications::notifications_router())
        .merge(streaming::streaming_router())
        .merge(users::users_router())
}
