//! API response DTOs
//!
//! Data Transfer Objects for the client-facing JSON API. Fields are
//! camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Conversation, FriendEdge, Message, Notification, User};

/// User response, never exposes the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub status: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            bio: user.bio.clone(),
            status: user.status.clone(),
        }
    }
}

/// Conversation with its resolved participants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: Option<String>,
    pub participants: Vec<UserResponse>,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
}

impl ConversationResponse {
    pub fn new(conversation: &Conversation, participants: &[User]) -> Self {
        Self {
            id: conversation.id.clone(),
            is_group: conversation.is_group,
            name: conversation.name.clone(),
            avatar_url: conversation.avatar_url.clone(),
            created_by: conversation.created_by.clone(),
            participants: participants.iter().map(UserResponse::from).collect(),
            last_message: conversation.last_message.clone(),
            last_message_at: conversation.last_message_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }
}

/// Friend edge with the user on the other side resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendResponse {
    /// Edge id, needed to accept or reject
    pub request_id: String,
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl FriendResponse {
    pub fn new(edge: &FriendEdge, other: &User) -> Self {
        Self {
            request_id: edge.id.clone(),
            user_id: other.id.clone(),
            username: other.username.clone(),
            full_name: other.full_name.clone(),
            avatar_url: other.avatar_url.clone(),
            status: edge.status.clone(),
            created_at: edge.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    pub sender_id: String,
    pub style: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationResponse {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id.clone(),
            sender_id: notification.sender_id.clone(),
            style: notification.style.clone(),
            content: notification.content.clone(),
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

/// User search result with the friendship state seen from the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    /// NONE, FRIEND, PENDING_SENT or PENDING_RECEIVED
    pub friend_status: String,
    /// Edge id when a request is pending, for accept/cancel
    pub request_id: Option<String>,
}
