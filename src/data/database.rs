//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with a connection pool; migrations run on connect.

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Whether an sqlx error is a uniqueness-constraint violation.
///
/// The canonical-pair guards (direct conversations, friend edges) rely on
/// this to distinguish a lost creation race from a genuine failure.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db_err| matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation))
        .unwrap_or(false)
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let db_path = path.to_str().ok_or_else(|| {
            AppError::Config(format!(
                "database path must be valid UTF-8: {}",
                path.display()
            ))
        })?;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .map_err(AppError::Database)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user
    ///
    /// Fails with a unique violation if the username is taken.
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, full_name, email, avatar_url, bio, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(&user.status)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Fetch users for a set of ids
    ///
    /// Returns only the users that exist; the caller compares lengths
    /// when it needs every id to resolve.
    pub async fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let users = builder.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok(users)
    }

    /// Update profile fields (display name, email, avatar, bio)
    pub async fn update_user_profile(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET full_name = ?, email = ?, avatar_url = ?, bio = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .bind(&user.bio)
        .bind(chrono::Utc::now())
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Flip the online/offline presence flag
    pub async fn set_user_status(&self, id: &str, status: UserStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Insert a direct conversation and its participants in one transaction
    ///
    /// A self-conversation (both sides the same user) gets a single
    /// participant row.
    ///
    /// Returns `Ok(false)` without writing anything when another caller
    /// already created the conversation for this pair (unique `direct_key`),
    /// so the caller can re-read the winning row.
    pub async fn try_insert_direct_conversation(
        &self,
        conversation: &Conversation,
        user_a: &str,
        user_b: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO conversations (id, is_group, name, avatar_url, created_by, direct_key, last_message, last_message_at, created_at)
             VALUES (?, 0, NULL, NULL, NULL, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.direct_key)
        .bind(&conversation.last_message)
        .bind(conversation.last_message_at)
        .bind(conversation.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let participant_ids = if user_a == user_b {
            vec![user_a]
        } else {
            vec![user_a, user_b]
        };
        for user_id in participant_ids {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?, ?)",
            )
            .bind(&conversation.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(true)
    }

    /// Insert a group conversation and all its participants in one transaction
    pub async fn insert_group_conversation(
        &self,
        conversation: &Conversation,
        participant_ids: &[String],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversations (id, is_group, name, avatar_url, created_by, direct_key, last_message, last_message_at, created_at)
             VALUES (?, 1, ?, ?, ?, NULL, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.name)
        .bind(&conversation.avatar_url)
        .bind(&conversation.created_by)
        .bind(&conversation.last_message)
        .bind(conversation.last_message_at)
        .bind(conversation.created_at)
        .execute(&mut *tx)
        .await?;

        for user_id in participant_ids {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?, ?)",
            )
            .bind(&conversation.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AppError> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    /// Get the canonical direct conversation for a normalized pair key
    pub async fn get_direct_conversation(
        &self,
        direct_key: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE direct_key = ?")
                .bind(direct_key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    /// All conversations the user participates in, newest activity first
    pub async fn list_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, AppError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?
             ORDER BY c.last_message_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    pub async fn get_participants(&self, conversation_id: &str) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u
             JOIN conversation_participants p ON p.user_id = u.id
             WHERE p.conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    pub async fn is_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversation_participants
             WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Insert a message and update the conversation preview atomically
    ///
    /// The denormalized `last_message`/`last_message_at` update is part of
    /// the same transaction as the message insert.
    pub async fn insert_message(&self, message: &Message) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.content)
        .bind(message.is_read)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_message = ?, last_message_at = ? WHERE id = ?")
            .bind(&message.content)
            .bind(message.created_at)
            .bind(&message.conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// All messages in a conversation, oldest first
    ///
    /// ULID ids are insertion-ordered, so the id tie-break preserves
    /// creation order for messages sharing a timestamp.
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Mark every unread message authored by someone else as read
    ///
    /// Returns the number of rows flipped; zero is a legal outcome
    /// (repeated calls are idempotent).
    pub async fn mark_messages_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ? AND sender_id <> ? AND is_read = 0",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Friend edges
    // =========================================================================

    /// Insert a friend edge
    ///
    /// Returns `Ok(false)` when an edge for the pair already exists
    /// (unique `pair_key`), leaving the existing edge untouched.
    pub async fn try_insert_friend_edge(&self, edge: &FriendEdge) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            "INSERT INTO friend_edges (id, requester_id, receiver_id, status, pair_key, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&edge.id)
        .bind(&edge.requester_id)
        .bind(&edge.receiver_id)
        .bind(&edge.status)
        .bind(&edge.pair_key)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_friend_edge(&self, id: &str) -> Result<Option<FriendEdge>, AppError> {
        let edge = sqlx::query_as::<_, FriendEdge>("SELECT * FROM friend_edges WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(edge)
    }

    /// The edge for an unordered pair, whichever side requested it
    pub async fn get_friend_edge_for_pair(
        &self,
        pair_key: &str,
    ) -> Result<Option<FriendEdge>, AppError> {
        let edge = sqlx::query_as::<_, FriendEdge>("SELECT * FROM friend_edges WHERE pair_key = ?")
            .bind(pair_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(edge)
    }

    pub async fn update_friend_edge_status(
        &self,
        id: &str,
        status: FriendshipStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE friend_edges SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_friend_edge(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM friend_edges WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Pending requests addressed to the user
    pub async fn list_pending_received(&self, user_id: &str) -> Result<Vec<FriendEdge>, AppError> {
        let edges = sqlx::query_as::<_, FriendEdge>(
            "SELECT * FROM friend_edges WHERE receiver_id = ? AND status = 'pending'
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(edges)
    }

    /// Pending requests the user sent
    pub async fn list_pending_sent(&self, user_id: &str) -> Result<Vec<FriendEdge>, AppError> {
        let edges = sqlx::query_as::<_, FriendEdge>(
            "SELECT * FROM friend_edges WHERE requester_id = ? AND status = 'pending'
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(edges)
    }

    /// Accepted edges touching the user, either side
    pub async fn list_accepted(&self, user_id: &str) -> Result<Vec<FriendEdge>, AppError> {
        let edges = sqlx::query_as::<_, FriendEdge>(
            "SELECT * FROM friend_edges
             WHERE (requester_id = ? OR receiver_id = ?) AND status = 'accepted'
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(edges)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub async fn insert_notification(&self, notification: &Notification) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, sender_id, style, content, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.recipient_id)
        .bind(&notification.sender_id)
        .bind(&notification.style)
        .bind(&notification.content)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a batch of notifications in one transaction (all-or-nothing)
    pub async fn insert_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for notification in notifications {
            sqlx::query(
                "INSERT INTO notifications (id, recipient_id, sender_id, style, content, is_read, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&notification.id)
            .bind(&notification.recipient_id)
            .bind(&notification.sender_id)
            .bind(&notification.style)
            .bind(&notification.content)
            .bind(notification.is_read)
            .bind(notification.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn get_notification(&self, id: &str) -> Result<Option<Notification>, AppError> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(notification)
    }

    pub async fn list_notifications(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE recipient_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    pub async fn list_unread_notifications(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE recipient_id = ? AND is_read = 0
             ORDER BY created_at DESC, id DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
