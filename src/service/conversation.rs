//! Conversation directory
//!
//! Resolves and creates conversations. Direct (1:1) conversations are
//! deduplicated per unordered user pair; group conversations are created
//! with an explicit member list.

use std::sync::Arc;

use crate::data::{Conversation, Database, EntityId, User, pair_key};
use crate::error::AppError;

/// Preview text written when a group is created, before any message
const GROUP_CREATED_PREVIEW: &str = "Group created";

pub struct ConversationDirectory {
    db: Arc<Database>,
}

impl ConversationDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Return the canonical direct conversation for a user pair, creating
    /// it if absent.
    ///
    /// Safe under concurrent invocation from both sides: creation is
    /// compare-and-create on the sorted pair key. A caller that loses the
    /// race re-reads and returns the winner's record instead of erroring.
    pub async fn resolve_or_create_direct(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation, AppError> {
        let key = pair_key(user_a, user_b);

        if let Some(existing) = self.db.get_direct_conversation(&key).await? {
            return Ok(existing);
        }

        let now = chrono::Utc::now();
        let conversation = Conversation {
            id: EntityId::new().0,
            is_group: false,
            name: None,
            avatar_url: None,
            created_by: None,
            direct_key: Some(key.clone()),
            last_message: None,
            last_message_at: now,
            created_at: now,
        };

        let inserted = self
            .db
            .try_insert_direct_conversation(&conversation, user_a, user_b)
            .await?;

        if inserted {
            tracing::debug!(
                conversation_id = %conversation.id,
                "Created direct conversation"
            );
            return Ok(conversation);
        }

        // Lost the creation race; the winner's row must exist now.
        self.db
            .get_direct_conversation(&key)
            .await?
            .ok_or_else(|| {
                AppError::Conflict("direct conversation creation race left no record".to_string())
            })
    }

    /// Create a group conversation
    ///
    /// Participants are the creator plus at least two other resolved users.
    pub async fn create_group(
        &self,
        creator_id: &str,
        member_ids: &[String],
        name: &str,
        avatar_url: Option<String>,
    ) -> Result<Conversation, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Group name is required".to_string()));
        }

        let mut members: Vec<String> = member_ids
            .iter()
            .filter(|id| id.as_str() != creator_id)
            .cloned()
            .collect();
        members.sort();
        members.dedup();

        if members.len() < 2 {
            return Err(AppError::Validation(
                "Group must have at least 3 members (including you)".to_string(),
            ));
        }

        let creator = self
            .db
            .get_user(creator_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let resolved = self.db.get_users_by_ids(&members).await?;
        if resolved.len() != members.len() {
            return Err(AppError::NotFound(
                "One or more group members do not exist".to_string(),
            ));
        }

        let now = chrono::Utc::now();
        let conversation = Conversation {
            id: EntityId::new().0,
            is_group: true,
            name: Some(name.to_string()),
            avatar_url,
            created_by: Some(creator.id.clone()),
            direct_key: None,
            last_message: Some(GROUP_CREATED_PREVIEW.to_string()),
            last_message_at: now,
            created_at: now,
        };

        let mut participant_ids = members;
        participant_ids.push(creator.id.clone());

        self.db
            .insert_group_conversation(&conversation, &participant_ids)
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            creator = %creator.username,
            members = participant_ids.len(),
            "Created group conversation"
        );

        Ok(conversation)
    }

    /// All conversations the user participates in, newest activity first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>, AppError> {
        self.db.list_conversations_for_user(user_id).await
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Conversation, AppError> {
        self.db
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }

    pub async fn participants(&self, conversation_id: &str) -> Result<Vec<User>, AppError> {
        self.db.get_participants(conversation_id).await
    }

    pub async fn is_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, AppError> {
        self.db.is_participant(conversation_id, user_id).await
    }
}
