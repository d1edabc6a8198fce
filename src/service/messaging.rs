//! Messaging fan-out
//!
//! Persists messages, typing and read events and delivers them to the
//! right subscribers: the per-conversation topic plus every participant's
//! private queue. Persistence commits before any delivery; delivery is
//! fire-and-forget.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bus::{MessageBus, channel};
use crate::data::{Database, EntityId, Message, User};
use crate::error::AppError;
use crate::service::ConversationDirectory;

/// Destination and content of an outbound message
///
/// Exactly one of `conversation_id`/`recipient_id` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub conversation_id: Option<String>,
    pub recipient_id: Option<String>,
    pub content: String,
}

/// Payload published on the conversation topic and private queues
#[derive(Debug, Clone, Serialize)]
pub struct MessageEvent {
    pub event: &'static str,
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_name: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Payload published on the typing channel, never persisted
#[derive(Debug, Clone, Serialize)]
pub struct TypingEvent {
    pub event: &'static str,
    pub conversation_id: String,
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub is_typing: bool,
}

/// Payload published on the read and main channels after a mark-read
#[derive(Debug, Clone, Serialize)]
pub struct ReadReceiptEvent {
    pub event: &'static str,
    pub conversation_id: String,
    pub reader_id: String,
    pub reader_name: String,
}

pub struct MessagingFanout {
    db: Arc<Database>,
    directory: Arc<ConversationDirectory>,
    bus: Arc<dyn MessageBus>,
}

impl MessagingFanout {
    pub fn new(
        db: Arc<Database>,
        directory: Arc<ConversationDirectory>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            db,
            directory,
            bus,
        }
    }

    /// Persist and deliver a message
    ///
    /// With a `conversation_id` the sender must be a participant; with a
    /// `recipient_id` the canonical direct conversation is resolved or
    /// created. The message insert and the conversation preview update
    /// commit together; only then does delivery start.
    ///
    /// Delivery goes to the conversation topic and, explicitly, to every
    /// participant's private queue. The private push is load-bearing: a
    /// participant of a conversation created by this very call cannot be
    /// subscribed to its topic yet.
    pub async fn send(&self, sender_id: &str, request: SendMessage) -> Result<Message, AppError> {
        let sender = self
            .db
            .get_user(sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if request.content.trim().is_empty() {
            return Err(AppError::Validation(
                "Message content must not be empty".to_string(),
            ));
        }

        let conversation = match (&request.conversation_id, &request.recipient_id) {
            (Some(conversation_id), None) => {
                let conversation = self.directory.get(conversation_id).await?;
                if !self
                    .directory
                    .is_participant(conversation_id, sender_id)
                    .await?
                {
                    return Err(AppError::NotFound("Conversation not found".to_string()));
                }
                conversation
            }
            (None, Some(recipient_id)) => {
                self.db
                    .get_user(recipient_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Recipient not found".to_string()))?;
                self.directory
                    .resolve_or_create_direct(sender_id, recipient_id)
                    .await?
            }
            _ => {
                return Err(AppError::Validation(
                    "Exactly one of conversationId and recipientId must be given".to_string(),
                ));
            }
        };

        let message = Message {
            id: EntityId::new().0,
            conversation_id: conversation.id.clone(),
            sender_id: sender.id.clone(),
            content: request.content,
            is_read: false,
            created_at: chrono::Utc::now(),
        };

        self.db.insert_message(&message).await?;

        tracing::debug!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            sender = %sender.username,
            "Message persisted"
        );

        self.deliver(&message, &sender).await?;

        Ok(message)
    }

    /// Broadcast a typing indicator, best effort, never persisted
    pub async fn typing_event(
        &self,
        conversation_id: &str,
        user_id: &str,
        is_typing: bool,
    ) -> Result<(), AppError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let event = TypingEvent {
            event: "typing",
            conversation_id: conversation_id.to_string(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            is_typing,
        };

        self.publish(&channel::conversation_typing(conversation_id), &event);

        Ok(())
    }

    /// Flip unread messages authored by others to read, then broadcast
    ///
    /// The receipt goes out on both the dedicated read channel and the main
    /// conversation channel, even when zero rows changed: repeated calls
    /// are idempotent no-ops that still confirm receipt to peers.
    pub async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64, AppError> {
        // Conversation must exist before the receipt is broadcast.
        self.directory.get(conversation_id).await?;

        let reader = self
            .db
            .get_user(reader_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let updated = self.db.mark_messages_read(conversation_id, reader_id).await?;

        tracing::debug!(
            conversation_id,
            reader = %reader.username,
            updated,
            "Marked messages as read"
        );

        let event = ReadReceiptEvent {
            event: "read_receipt",
            conversation_id: conversation_id.to_string(),
            reader_id: reader.id.clone(),
            reader_name: reader.full_name.clone(),
        };

        self.publish(&channel::conversation_read(conversation_id), &event);
        self.publish(&channel::conversation(conversation_id), &event);

        Ok(updated)
    }

    /// All messages for a conversation, append order
    pub async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        self.directory.get(conversation_id).await?;
        self.db.get_messages(conversation_id).await
    }

    async fn deliver(&self, message: &Message, sender: &User) -> Result<(), AppError> {
        let event = MessageEvent {
            event: "message",
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender_id: sender.id.clone(),
            sender_username: sender.username.clone(),
            sender_name: sender.full_name.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
        };

        self.publish(&channel::conversation(&message.conversation_id), &event);

        let participants = self.directory.participants(&message.conversation_id).await?;
        for participant in participants {
            self.publish(&channel::user_queue(&participant.id), &event);
        }

        Ok(())
    }

    fn publish<T: Serialize>(&self, channel: &str, event: &T) {
        match serde_json::to_value(event) {
            Ok(payload) => self.bus.publish(channel, payload),
            Err(error) => {
                tracing::warn!(channel, %error, "Failed to serialize event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;
    use crate::data::UserStatus;
    use tempfile::TempDir;

    struct Fixture {
        db: Arc<Database>,
        bus: Arc<RecordingBus>,
        directory: Arc<ConversationDirectory>,
        fanout: MessagingFanout,
        _tmp: TempDir,
    }

    async fn setup() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&tmp.path().join("test.db")).await.unwrap(),
        );
        let bus = Arc::new(RecordingBus::new());
        let directory = Arc::new(ConversationDirectory::new(db.clone()));
        let fanout = MessagingFanout::new(db.clone(), directory.clone(), bus.clone());
        Fixture {
            db,
            bus,
            directory,
            fanout,
            _tmp: tmp,
        }
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

    fn send_to_recipient(recipient_id: &str, content: &str) -> SendMessage {
        SendMessage {
            conversation_id: None,
            recipient_id: Some(recipient_id.to_string()),
            content: content.to_string(),
        }
    }

    fn send_to_conversation(conversation_id: &str, content: &str) -> SendMessage {
        SendMessage {
            conversation_id: Some(conversation_id.to_string()),
            recipient_id: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn first_message_creates_conversation_and_reaches_both_queues() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;

        let message = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "hi"))
            .await
            .unwrap();

        let conversations = f.directory.list_for_user(&alice).await.unwrap();
        assert_eq!(conversations.len(), 1);
        let conversation = &conversations[0];
        assert_eq!(conversation.id, message.conversation_id);
        assert_eq!(conversation.last_message.as_deref(), Some("hi"));

        // Topic plus both private queues, regardless of subscriptions.
        let channels = f.bus.channels();
        assert!(channels.contains(&channel::conversation(&conversation.id)));
        assert!(channels.contains(&channel::user_queue(&alice)));
        assert!(channels.contains(&channel::user_queue(&bob)));
        assert_eq!(channels.len(), 3);
    }

    #[tokio::test]
    async fn message_to_self_lands_in_a_single_participant_conversation() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;

        let message = f
            .fanout
            .send(&alice, send_to_recipient(&alice, "note to self"))
            .await
            .unwrap();

        let participants = f
            .directory
            .participants(&message.conversation_id)
            .await
            .unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].id, alice);

        // Topic plus the one private queue, pushed exactly once.
        let channels = f.bus.channels();
        assert_eq!(
            channels,
            vec![
                channel::conversation(&message.conversation_id),
                channel::user_queue(&alice),
            ]
        );

        // A second self-message reuses the same conversation.
        let second = f
            .fanout
            .send(&alice, send_to_recipient(&alice, "again"))
            .await
            .unwrap();
        assert_eq!(second.conversation_id, message.conversation_id);
    }

    #[tokio::test]
    async fn reply_reuses_the_conversation_and_appends() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;

        let first = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "hi"))
            .await
            .unwrap();
        let second = f
            .fanout
            .send(&bob, send_to_conversation(&first.conversation_id, "hey"))
            .await
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(f.directory.list_for_user(&bob).await.unwrap().len(), 1);

        let history = f.fanout.fetch_history(&first.conversation_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[1].id, second.id);
        assert!(history[0].created_at <= history[1].created_at);
    }

    #[tokio::test]
    async fn send_validates_destination_and_membership() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;
        let mallory = create_user(&f.db, "mallory").await;

        let no_destination = f
            .fanout
            .send(
                &alice,
                SendMessage {
                    conversation_id: None,
                    recipient_id: None,
                    content: "hi".to_string(),
                },
            )
            .await;
        assert!(matches!(no_destination, Err(AppError::Validation(_))));

        let unknown_recipient = f
            .fanout
            .send(&alice, send_to_recipient("missing", "hi"))
            .await;
        assert!(matches!(unknown_recipient, Err(AppError::NotFound(_))));

        let message = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "hi"))
            .await
            .unwrap();

        // A non-participant cannot address the conversation by id.
        let outsider = f
            .fanout
            .send(
                &mallory,
                send_to_conversation(&message.conversation_id, "intruding"),
            )
            .await;
        assert!(matches!(outsider, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_always_broadcasts() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;

        let message = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "hi"))
            .await
            .unwrap();
        let conversation_id = message.conversation_id.clone();
        let publishes_before = f.bus.published().len();

        let first = f.fanout.mark_read(&conversation_id, &bob).await.unwrap();
        assert_eq!(first, 1);

        let second = f.fanout.mark_read(&conversation_id, &bob).await.unwrap();
        assert_eq!(second, 0);

        let history = f.fanout.fetch_history(&conversation_id).await.unwrap();
        assert!(history.iter().all(|m| m.is_read));

        // Both calls broadcast to the read channel and the main channel.
        let channels: Vec<String> = f.bus.channels()[publishes_before..].to_vec();
        assert_eq!(
            channels,
            vec![
                channel::conversation_read(&conversation_id),
                channel::conversation(&conversation_id),
                channel::conversation_read(&conversation_id),
                channel::conversation(&conversation_id),
            ]
        );
    }

    #[tokio::test]
    async fn own_messages_are_not_flipped_by_mark_read() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;

        let message = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "hi"))
            .await
            .unwrap();

        // The sender marking their own conversation flips nothing.
        let updated = f
            .fanout
            .mark_read(&message.conversation_id, &alice)
            .await
            .unwrap();
        assert_eq!(updated, 0);

        let history = f.fanout.fetch_history(&message.conversation_id).await.unwrap();
        assert!(!history[0].is_read);
    }

    #[tokio::test]
    async fn typing_events_broadcast_without_persisting() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;

        let message = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "hi"))
            .await
            .unwrap();
        let conversation_id = message.conversation_id.clone();

        f.fanout
            .typing_event(&conversation_id, &bob, true)
            .await
            .unwrap();
        f.fanout
            .typing_event(&conversation_id, &bob, false)
            .await
            .unwrap();

        let typing_channel = channel::conversation_typing(&conversation_id);
        let typing_events: Vec<_> = f
            .bus
            .published()
            .into_iter()
            .filter(|(ch, _)| ch == &typing_channel)
            .collect();
        assert_eq!(typing_events.len(), 2);
        assert_eq!(typing_events[0].1["is_typing"], true);
        assert_eq!(typing_events[1].1["is_typing"], false);

        // Nothing was written to the message history.
        let history = f.fanout.fetch_history(&conversation_id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn fetch_history_preserves_interleaved_insertion_order() {
        let f = setup().await;
        let alice = create_user(&f.db, "alice").await;
        let bob = create_user(&f.db, "bob").await;

        let first = f
            .fanout
            .send(&alice, send_to_recipient(&bob, "m0"))
            .await
            .unwrap();
        let conversation_id = first.conversation_id.clone();

        for i in 1..6 {
            let sender = if i % 2 == 0 { &alice } else { &bob };
            f.fanout
                .send(sender, send_to_conversation(&conversation_id, &format!("m{}", i)))
                .await
                .unwrap();
        }

        let history = f.fanout.fetch_history(&conversation_id).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4", "m5"]);
        for pair in history.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }
}
