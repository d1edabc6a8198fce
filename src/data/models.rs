//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized key for an unordered user pair ("min_id:max_id")
///
/// Used for the uniqueness guard on direct conversations and friend edges.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered user
///
/// Owned by the profile subsystem; the messaging core only ever
/// reads users and flips the online status.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    /// bcrypt hash, never serialized out through the API layer
    pub password_hash: String,
    pub full_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    /// Presence: online, offline
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binary presence flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Online,
    Offline,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// A direct (1:1) or group conversation
///
/// `direct_key` is set only for direct conversations and carries the
/// normalized participant pair; a partial unique index on it enforces
/// the canonical direct conversation invariant.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub is_group: bool,
    /// Group name (groups only)
    pub name: Option<String>,
    /// Group avatar (groups only)
    pub avatar_url: Option<String>,
    /// Creator/admin user id (groups only)
    pub created_by: Option<String>,
    /// Sorted participant pair key (direct conversations only)
    pub direct_key: Option<String>,
    /// Denormalized preview of the latest message, for inbox ordering
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Message
// =============================================================================

/// A chat message
///
/// Immutable once created, except `is_read` which only ever
/// flips false -> true.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Friend edges
// =============================================================================

/// The friendship record between two users
///
/// At most one edge exists per unordered user pair (enforced by the
/// unique `pair_key`). Requester/receiver roles are fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendEdge {
    pub id: String,
    pub requester_id: String,
    pub receiver_id: String,
    /// pending or accepted; rejected/cancelled/unfriended edges are deleted
    pub status: String,
    pub pair_key: String,
    pub created_at: DateTime<Utc>,
}

/// Friend edge lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// Relationship between two users as seen from one side
///
/// `PendingSent`/`PendingReceived` carry the edge id so the caller
/// can later accept or cancel the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FriendState {
    None,
    Friend,
    PendingSent { edge_id: String },
    PendingReceived { edge_id: String },
}

impl FriendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Friend => "FRIEND",
            Self::PendingSent { .. } => "PENDING_SENT",
            Self::PendingReceived { .. } => "PENDING_RECEIVED",
        }
    }

    pub fn edge_id(&self) -> Option<&str> {
        match self {
            Self::PendingSent { edge_id } | Self::PendingReceived { edge_id } => {
                Some(edge_id.as_str())
            }
            Self::None | Self::Friend => None,
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Notification for social events
///
/// Persisted to database; `is_read` only ever flips false -> true.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    /// Who triggered this notification
    pub sender_id: String,
    /// Style: friend_request, friend_accepted, group_add
    pub style: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification styles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStyle {
    FriendRequest,
    FriendAccepted,
    GroupAdd,
}

impl NotificationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friend_request",
            Self::FriendAccepted => "friend_accepted",
            Self::GroupAdd => "group_add",
        }
    }
}
