//! Friendship graph
//!
//! State machine governing the friend-request lifecycle between user
//! pairs: NONE -> PENDING -> ACCEPTED, with PENDING -> NONE (reject or
//! cancel) and ACCEPTED -> NONE (unfriend). At most one edge exists per
//! unordered pair, enforced by a unique sorted pair key.

use std::sync::Arc;

use crate::data::{
    Database, EntityId, FriendEdge, FriendState, FriendshipStatus, NotificationStyle, User,
    pair_key,
};
use crate::error::AppError;
use crate::service::NotificationDispatcher;

/// A friend edge together with the user on the other side
pub struct EdgeWithUser {
    pub edge: FriendEdge,
    pub user: User,
}

pub struct FriendshipGraph {
    db: Arc<Database>,
    notifications: Arc<NotificationDispatcher>,
}

impl FriendshipGraph {
    pub fn new(db: Arc<Database>, notifications: Arc<NotificationDispatcher>) -> Self {
        Self { db, notifications }
    }

    /// Send a friend request to a user by username
    ///
    /// Creates a PENDING edge and notifies the target. Fails with Conflict
    /// when any edge already exists for the pair; the message distinguishes
    /// an accepted edge from a pending one, and for pending edges which
    /// side sent the original request.
    pub async fn send_request(
        &self,
        requester_id: &str,
        target_username: &str,
    ) -> Result<FriendEdge, AppError> {
        let target = self
            .db
            .get_user_by_username(target_username)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if target.id == requester_id {
            return Err(AppError::Validation(
                "Cannot send a friend request to yourself".to_string(),
            ));
        }

        let requester = self
            .db
            .get_user(requester_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let key = pair_key(requester_id, &target.id);
        if let Some(existing) = self.db.get_friend_edge_for_pair(&key).await? {
            return Err(self.existing_edge_conflict(&existing, requester_id));
        }

        let edge = FriendEdge {
            id: EntityId::new().0,
            requester_id: requester.id.clone(),
            receiver_id: target.id.clone(),
            status: FriendshipStatus::Pending.as_str().to_string(),
            pair_key: key.clone(),
            created_at: chrono::Utc::now(),
        };

        let inserted = self.db.try_insert_friend_edge(&edge).await?;
        if !inserted {
            // Lost a creation race for the pair; report the surviving edge.
            let existing = self
                .db
                .get_friend_edge_for_pair(&key)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict("friend edge creation race left no record".to_string())
                })?;
            return Err(self.existing_edge_conflict(&existing, requester_id));
        }

        tracing::info!(
            requester = %requester.username,
            target = %target.username,
            "Friend request sent"
        );

        // Delivery failure here must not undo the persisted edge.
        let content = format!("{} sent you a friend request", requester.full_name);
        if let Err(error) = self
            .notifications
            .emit(
                &target.id,
                &requester.id,
                NotificationStyle::FriendRequest,
                &content,
            )
            .await
        {
            tracing::warn!(%error, "Failed to emit friend request notification");
        }

        Ok(edge)
    }

    /// Accept a pending friend request
    ///
    /// Receiver-only; transitions the edge to ACCEPTED and notifies the
    /// original requester.
    pub async fn accept(&self, edge_id: &str, actor_id: &str) -> Result<(), AppError> {
        let edge = self.get_edge(edge_id).await?;

        if edge.receiver_id != actor_id {
            return Err(AppError::PermissionDenied(
                "Only the receiver can accept this request".to_string(),
            ));
        }

        match FriendshipStatus::parse(&edge.status) {
            Some(FriendshipStatus::Pending) => {}
            Some(FriendshipStatus::Accepted) => {
                return Err(AppError::Conflict("Already friends".to_string()));
            }
            None => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "unknown friendship status: {}",
                    edge.status
                )));
            }
        }

        self.db
            .update_friend_edge_status(&edge.id, FriendshipStatus::Accepted)
            .await?;

        let actor = self
            .db
            .get_user(actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let content = format!("{} accepted your friend request", actor.full_name);
        if let Err(error) = self
            .notifications
            .emit(
                &edge.requester_id,
                actor_id,
                NotificationStyle::FriendAccepted,
                &content,
            )
            .await
        {
            tracing::warn!(%error, "Failed to emit friend accepted notification");
        }

        Ok(())
    }

    /// Reject a pending friend request, deleting the edge
    ///
    /// Receiver-only.
    pub async fn reject(&self, edge_id: &str, actor_id: &str) -> Result<(), AppError> {
        let edge = self.get_edge(edge_id).await?;

        if edge.receiver_id != actor_id {
            return Err(AppError::PermissionDenied(
                "Only the receiver can reject this request".to_string(),
            ));
        }

        if FriendshipStatus::parse(&edge.status) != Some(FriendshipStatus::Pending) {
            return Err(AppError::Conflict(
                "Only a pending request can be rejected".to_string(),
            ));
        }

        self.db.delete_friend_edge(&edge.id).await
    }

    /// Withdraw a pending request the caller sent
    pub async fn cancel(&self, requester_id: &str, target_id: &str) -> Result<(), AppError> {
        let key = pair_key(requester_id, target_id);
        let edge = self.db.get_friend_edge_for_pair(&key).await?;

        let Some(edge) = edge else {
            return Err(AppError::NotFound(
                "No pending request to cancel".to_string(),
            ));
        };

        // Only the pending edge this caller created can be withdrawn.
        if edge.requester_id != requester_id
            || FriendshipStatus::parse(&edge.status) != Some(FriendshipStatus::Pending)
        {
            return Err(AppError::NotFound(
                "No pending request to cancel".to_string(),
            ));
        }

        self.db.delete_friend_edge(&edge.id).await
    }

    /// Remove an accepted friendship, either side may invoke
    pub async fn unfriend(&self, me_id: &str, other_id: &str) -> Result<(), AppError> {
        let key = pair_key(me_id, other_id);
        let edge = self
            .db
            .get_friend_edge_for_pair(&key)
            .await?
            .ok_or_else(|| AppError::NotFound("Not friends".to_string()))?;

        if FriendshipStatus::parse(&edge.status) != Some(FriendshipStatus::Accepted) {
            return Err(AppError::Conflict("Not friends".to_string()));
        }

        self.db.delete_friend_edge(&edge.id).await
    }

    /// Relationship between two users as seen from `me_id`
    pub async fn query_status(&self, me_id: &str, other_id: &str) -> Result<FriendState, AppError> {
        let key = pair_key(me_id, other_id);
        let Some(edge) = self.db.get_friend_edge_for_pair(&key).await? else {
            return Ok(FriendState::None);
        };

        let state = match FriendshipStatus::parse(&edge.status) {
            Some(FriendshipStatus::Accepted) => FriendState::Friend,
            Some(FriendshipStatus::Pending) if edge.requester_id == me_id => {
                FriendState::PendingSent { edge_id: edge.id }
            }
            Some(FriendshipStatus::Pending) => FriendState::PendingReceived { edge_id: edge.id },
            None => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "unknown friendship status: {}",
                    edge.status
                )));
            }
        };

        Ok(state)
    }

    /// Accepted friendships with the user on the other side resolved
    pub async fn list_friends(&self, me_id: &str) -> Result<Vec<EdgeWithUser>, AppError> {
        let edges = self.db.list_accepted(me_id).await?;
        self.with_other_side(edges, me_id).await
    }

    /// Pending requests addressed to the user (requester resolved)
    pub async fn list_pending_received(&self, me_id: &str) -> Result<Vec<EdgeWithUser>, AppError> {
        let edges = self.db.list_pending_received(me_id).await?;
        self.with_other_side(edges, me_id).await
    }

    /// Pending requests the user sent (receiver resolved)
    pub async fn list_pending_sent(&self, me_id: &str) -> Result<Vec<EdgeWithUser>, AppError> {
        let edges = self.db.list_pending_sent(me_id).await?;
        self.with_other_side(edges, me_id).await
    }

    async fn get_edge(&self, edge_id: &str) -> Result<FriendEdge, AppError> {
        self.db
            .get_friend_edge(edge_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))
    }

    fn existing_edge_conflict(&self, edge: &FriendEdge, requester_id: &str) -> AppError {
        match FriendshipStatus::parse(&edge.status) {
            Some(FriendshipStatus::Accepted) => AppError::Conflict("Already friends".to_string()),
            Some(FriendshipStatus::Pending) if edge.requester_id == requester_id => {
                AppError::Conflict("You already sent a friend request".to_string())
            }
            Some(FriendshipStatus::Pending) => {
                AppError::Conflict("This user already sent you a friend request".to_string())
            }
            None => AppError::Internal(anyhow::anyhow!(
                "unknown friendship status: {}",
                edge.status
            )),
        }
    }

    async fn with_other_side(
        &self,
        edges: Vec<FriendEdge>,
        me_id: &str,
    ) -> Result<Vec<EdgeWithUser>, AppError> {
        let mut result = Vec::with_capacity(edges.len());
        for edge in edges {
            let other_id = if edge.requester_id == me_id {
                &edge.receiver_id
            } else {
                &edge.requester_id
            };
            let Some(user) = self.db.get_user(other_id).await? else {
                tracing::warn!(edge_id = %edge.id, "Friend edge references missing user");
                continue;
            };
            result.push(EdgeWithUser { edge, user });
        }
        Ok(result)
    }
}
