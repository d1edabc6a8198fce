//! Notification dispatcher
//!
//! Persists notifications for social events and pushes them onto the
//! recipient's personal notification channel. Persistence is atomic;
//! the push is fire-and-forget.

use std::sync::Arc;

use serde::Serialize;

use crate::bus::{MessageBus, channel};
use crate::data::{Database, EntityId, Notification, NotificationStyle};
use crate::error::AppError;

/// Payload published on the per-user notification channel
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub event: &'static str,
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub style: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct NotificationDispatcher {
    db: Arc<Database>,
    bus: Arc<dyn MessageBus>,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<Database>, bus: Arc<dyn MessageBus>) -> Self {
        Self { db, bus }
    }

    /// Persist one notification and push it to the recipient's channel
    ///
    /// The persisted write is all-or-nothing; the push happens after the
    /// write and cannot fail the operation.
    pub async fn emit(
        &self,
        recipient_id: &str,
        sender_id: &str,
        style: NotificationStyle,
        content: &str,
    ) -> Result<Notification, AppError> {
        let recipient = self
            .db
            .get_user(recipient_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification recipient not found".to_string()))?;
        let sender = self
            .db
            .get_user(sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification sender not found".to_string()))?;

        let notification = Notification {
            id: EntityId::new().0,
            recipient_id: recipient.id.clone(),
            sender_id: sender.id.clone(),
            style: style.as_str().to_string(),
            content: content.to_string(),
            is_read: false,
            created_at: chrono::Utc::now(),
        };

        self.db.insert_notification(&notification).await?;
        self.push(&notification, &sender.full_name);

        Ok(notification)
    }

    /// Emit one notification per recipient for a group event
    ///
    /// Every recipient id is validated before anything is written; a single
    /// unknown id fails the whole batch with no partial writes. The rows are
    /// inserted in one transaction, then pushed independently.
    pub async fn emit_batch(
        &self,
        sender_id: &str,
        recipient_ids: &[String],
        group_name: &str,
        style: NotificationStyle,
    ) -> Result<Vec<Notification>, AppError> {
        let sender = self
            .db
            .get_user(sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification sender not found".to_string()))?;

        let recipients = self.db.get_users_by_ids(recipient_ids).await?;
        if recipients.len() != recipient_ids.len() {
            return Err(AppError::NotFound(
                "Recipient list contains unknown users".to_string(),
            ));
        }

        let content = format!("{} added you to group {}", sender.full_name, group_name);
        let now = chrono::Utc::now();
        let notifications: Vec<Notification> = recipients
            .iter()
            .map(|recipient| Notification {
                id: EntityId::new().0,
                recipient_id: recipient.id.clone(),
                sender_id: sender.id.clone(),
                style: style.as_str().to_string(),
                content: content.clone(),
                is_read: false,
                created_at: now,
            })
            .collect();

        self.db.insert_notifications(&notifications).await?;

        for notification in &notifications {
            self.push(notification, &sender.full_name);
        }

        Ok(notifications)
    }

    /// Mark a notification read
    ///
    /// No-ops (success) when the notification is already read.
    pub async fn mark_read(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<(), AppError> {
        let notification = self
            .db
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

        if notification.recipient_id != recipient_id {
            return Err(AppError::PermissionDenied(
                "This notification belongs to another user".to_string(),
            ));
        }

        if notification.is_read {
            return Ok(());
        }

        self.db.mark_notification_read(notification_id).await
    }

    pub async fn list_all(&self, recipient_id: &str) -> Result<Vec<Notification>, AppError> {
        self.db.list_notifications(recipient_id).await
    }

    pub async fn list_unread(&self, recipient_id: &str) -> Result<Vec<Notification>, AppError> {
        self.db.list_unread_notifications(recipient_id).await
    }

    fn push(&self, notification: &Notification, sender_name: &str) {
        let event = NotificationEvent {
            event: "notification",
            id: notification.id.clone(),
            recipient_id: notification.recipient_id.clone(),
            sender_id: notification.sender_id.clone(),
            sender_name: sender_name.to_string(),
            style: notification.style.clone(),
            content: notification.content.clone(),
            created_at: notification.created_at,
        };

        match serde_json::to_value(&event) {
            Ok(payload) => self
                .bus
                .publish(&channel::user_notifications(&notification.recipient_id), payload),
            Err(error) => {
                tracing::warn!(%error, "Failed to serialize notification event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;
    use crate::data::{User, UserStatus};
    use tempfile::TempDir;

    async fn setup() -> (Arc<Database>, Arc<RecordingBus>, NotificationDispatcher, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let bus = Arc::new(RecordingBus::new());
        let dispatcher = NotificationDispatcher::new(db.clone(), bus.clone());
        (db, bus, dispatcher, temp_dir)
    }

    async fn create_user(db: &Database, username: &str) -> String {
        let now = chrono::Utc::now();
        let user = User {
            id: EntityId::new().0,
            username: username.to_string(),
            password_hash: "hash".to_string(),
            full_name: username.to_uppercase(),
            email: None,
            avatar_url: None,
            bio: None,
            status: UserStatus::Offline.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        db.insert_user(&user).await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn emit_persists_and_pushes() {
        let (db, bus, dispatcher, _tmp) = setup().await;
        let alice = create_user(&db, "alice").await;
        let bob = create_user(&db, "bob").await;

        let notification = dispatcher
            .emit(&bob, &alice, NotificationStyle::FriendRequest, "hi")
            .await
            .unwrap();

        assert!(!notification.is_read);
        assert_eq!(dispatcher.list_unread(&bob).await.unwrap().len(), 1);
        assert_eq!(bus.channels(), vec![channel::user_notifications(&bob)]);
    }

    #[tokio::test]
    async fn emit_fails_for_unknown_users() {
        let (db, _bus, dispatcher, _tmp) = setup().await;
        let alice = create_user(&db, "alice").await;

        let result = dispatcher
            .emit("missing", &alice, NotificationStyle::FriendRequest, "hi")
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = dispatcher
            .emit(&alice, "missing", NotificationStyle::FriendRequest, "hi")
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn emit_batch_is_all_or_nothing() {
        let (db, bus, dispatcher, _tmp) = setup().await;
        let sender = create_user(&db, "sender").await;
        let r1 = create_user(&db, "r1").await;
        let r2 = create_user(&db, "r2").await;

        let bad_batch = dispatcher
            .emit_batch(
                &sender,
                &[r1.clone(), "missing".to_string()],
                "Team",
                NotificationStyle::GroupAdd,
            )
            .await;
        assert!(matches!(bad_batch, Err(AppError::NotFound(_))));

        // Nothing was written and nothing was pushed.
        assert!(dispatcher.list_all(&r1).await.unwrap().is_empty());
        assert!(bus.published().is_empty());

        let good_batch = dispatcher
            .emit_batch(
                &sender,
                &[r1.clone(), r2.clone()],
                "Team",
                NotificationStyle::GroupAdd,
            )
            .await
            .unwrap();
        assert_eq!(good_batch.len(), 2);
        assert_eq!(dispatcher.list_all(&r1).await.unwrap().len(), 1);
        assert_eq!(dispatcher.list_all(&r2).await.unwrap().len(), 1);
        assert_eq!(bus.published().len(), 2);
    }

    #[tokio::test]
    async fn mark_read_checks_owner_and_is_idempotent() {
        let (db, _bus, dispatcher, _tmp) = setup().await;
        let alice = create_user(&db, "alice").await;
        let bob = create_user(&db, "bob").await;

        let notification = dispatcher
            .emit(&bob, &alice, NotificationStyle::FriendRequest, "hi")
            .await
            .unwrap();

        let wrong_owner = dispatcher.mark_read(&alice, &notification.id).await;
        assert!(matches!(wrong_owner, Err(AppError::PermissionDenied(_))));

        dispatcher.mark_read(&bob, &notification.id).await.unwrap();
        // Second call is a successful no-op.
        dispatcher.mark_read(&bob, &notification.id).await.unwrap();

        assert!(dispatcher.list_unread(&bob).await.unwrap().is_empty());

        let missing = dispatcher.mark_read(&bob, "missing").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
