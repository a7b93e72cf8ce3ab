//! Message lifecycle - send, edit within the window, and delete

use std::time::Duration;

use rand::Rng;
use sea_orm::*;
use tracing::{debug, info, warn};

use crate::clock::{from_millis, to_millis};
use crate::entities::{conversation_participants, conversations, message_deletions, messages};
use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::identity::Identity;
use crate::models::{
    preview_for, within_edit_window, DeleteMode, Message, MessageKind, MessageMetadata,
    MessageStatus, NewMessage, DELETED_PREVIEW, EDIT_WINDOW_SECONDS,
};
use crate::store::{self, ChatStore};
use crate::ChatConfig;

/// Creates, edits and deletes messages
#[derive(Clone)]
pub struct MessageLifecycle {
    store: ChatStore,
}

impl MessageLifecycle {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Send a message into a conversation the sender participates in
    ///
    /// Commits in one transaction: the message row, the conversation's last
    /// message cache, the sender's caught-up cursor, and the first-unread
    /// marker of every other participant that has none yet. Participants who
    /// had deleted the conversation get it back, with history before their
    /// deletion still hidden.
    pub async fn send(
        &self,
        sender: &Identity,
        conversation_id: &str,
        input: NewMessage,
    ) -> ChatResult<Message> {
        let input = validate_new_message(input, &self.store.config)?;

        let mut attempt = 0u32;
        loop {
            match self.try_send(sender, conversation_id, &input).await {
                Err(e) if e.is_busy() && attempt < self.store.config.max_busy_retries => {
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0..20u64);
                    let backoff = Duration::from_millis(25 * 2u64.pow(attempt) + jitter);
                    warn!(
                        conversation_id = %conversation_id,
                        attempt,
                        "Database busy while sending, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                result => return result,
            }
        }
    }

    async fn try_send(
        &self,
        sender: &Identity,
        conversation_id: &str,
        input: &NewMessage,
    ) -> ChatResult<Message> {
        let now_ms = self.store.now_millis();
        let txn = self.store.db.begin().await?;

        let conversation = store::find_conversation(&txn, conversation_id).await?;
        store::require_participant(&txn, conversation_id, &sender.profile_id).await?;
        let participants = store::list_participants(&txn, conversation_id).await?;

        // createdAt is strictly increasing inside one conversation and always
        // lands after every participant's visibility floor.
        let previous = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .order_by_desc(messages::Column::CreatedAt)
            .one(&txn)
            .await?;
        let floor = participants
            .iter()
            .flat_map(|p| [p.cleared_at, p.deleted_at])
            .flatten()
            .chain(previous.map(|prev| prev.created_at))
            .max();
        let created_at = match floor {
            Some(floor) if floor >= now_ms => floor + 1,
            _ => now_ms,
        };

        let metadata_json = input
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let row = messages::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            conversation_id: Set(conversation_id.to_string()),
            sender_id: Set(sender.profile_id.clone()),
            message_type: Set(input.kind.as_str().to_string()),
            content: Set(input.content.clone()),
            metadata_json: Set(metadata_json),
            status: Set(MessageStatus::Sent.as_str().to_string()),
            is_edited: Set(false),
            is_deleted_for_everyone: Set(false),
            created_at: Set(created_at),
            updated_at: Set(created_at),
            delivered_at: Set(None),
            read_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let preview = preview_for(
            input.kind,
            input.content.as_deref(),
            input.metadata.as_ref(),
            self.store.config.preview_max_chars,
        );
        let mut conv: conversations::ActiveModel = conversation.into();
        conv.last_message_at = Set(Some(created_at));
        conv.last_message_preview = Set(Some(preview));
        conv.updated_at = Set(now_ms);
        conv.update(&txn).await?;

        for participant in participants {
            let is_sender = participant.user_id == sender.profile_id;
            let mut active: conversation_participants::ActiveModel = participant.clone().into();
            let mut changed = false;

            if let Some(deleted_at) = participant.deleted_at {
                let floor = participant.cleared_at.map_or(deleted_at, |c| c.max(deleted_at));
                active.deleted_at = Set(None);
                active.cleared_at = Set(Some(floor));
                changed = true;
                info!(
                    conversation_id = %conversation_id,
                    user_id = %participant.user_id,
                    "Conversation reinstated by new message"
                );
            }

            if is_sender {
                active.last_read_at = Set(Some(created_at));
                active.first_unread_message_id = Set(None);
                changed = true;
            } else if participant.first_unread_message_id.is_none() {
                active.first_unread_message_id = Set(Some(row.id.clone()));
                changed = true;
            }

            if changed {
                active.update(&txn).await?;
            }
        }

        txn.commit().await?;

        let message = store::message_from_model(row, Default::default())?;
        debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender_id = %sender.profile_id,
            "Stored message"
        );

        self.store.emit(ChatEvent::MessageSent {
            conversation_id: conversation_id.to_string(),
            message: message.clone(),
        });

        Ok(message)
    }

    /// Replace a message's content
    ///
    /// Only the sender may edit, and only while the edit window is open. An
    /// edit whose trimmed content matches the current content is accepted
    /// without touching the row.
    pub async fn edit(
        &self,
        editor: &Identity,
        message_id: &str,
        new_content: &str,
    ) -> ChatResult<Message> {
        let now = self.store.clock.now();
        let txn = self.store.db.begin().await?;

        let row = store::find_message(&txn, message_id).await?;
        if row.sender_id != editor.profile_id {
            return Err(ChatError::forbidden("only the sender can edit a message"));
        }
        if !within_edit_window(from_millis(row.created_at), now) {
            return Err(ChatError::TimeLimitExceeded {
                message_id: message_id.to_string(),
                limit_seconds: EDIT_WINDOW_SECONDS,
            });
        }
        if row.is_deleted_for_everyone {
            return Err(ChatError::validation("message has been deleted"));
        }

        let content = validate_content(new_content, &self.store.config)?;
        if row.content.as_deref().map(str::trim) == Some(content.as_str()) {
            debug!(message_id = %message_id, "Edit leaves content unchanged");
            let message = store::hydrate_message(&txn, row).await?;
            txn.commit().await?;
            return Ok(message);
        }

        let conversation = store::find_conversation(&txn, &row.conversation_id).await?;
        let is_latest = conversation.last_message_at == Some(row.created_at);
        let kind: MessageKind = row.message_type.parse()?;
        let metadata: Option<MessageMetadata> = row
            .metadata_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        let mut active: messages::ActiveModel = row.into();
        active.content = Set(Some(content.clone()));
        active.is_edited = Set(true);
        active.updated_at = Set(to_millis(now));
        let row = active.update(&txn).await?;

        if is_latest {
            let preview = preview_for(
                kind,
                Some(&content),
                metadata.as_ref(),
                self.store.config.preview_max_chars,
            );
            let mut conv: conversations::ActiveModel = conversation.into();
            conv.last_message_preview = Set(Some(preview));
            conv.updated_at = Set(to_millis(now));
            conv.update(&txn).await?;
        }

        let message = store::hydrate_message(&txn, row).await?;
        txn.commit().await?;

        info!(message_id = %message_id, "Message edited");
        self.store.emit(ChatEvent::MessageEdited {
            conversation_id: message.conversation_id.clone(),
            message: message.clone(),
        });

        Ok(message)
    }

    /// Delete a message for the actor only, or for everyone
    pub async fn delete(
        &self,
        actor: &Identity,
        message_id: &str,
        mode: DeleteMode,
    ) -> ChatResult<()> {
        let now_ms = self.store.now_millis();
        let txn = self.store.db.begin().await?;
        let row = store::find_message(&txn, message_id).await?;
        let conversation_id = row.conversation_id.clone();

        match mode {
            DeleteMode::ForMe => {
                store::require_participant(&txn, &conversation_id, &actor.profile_id).await?;

                let existing = message_deletions::Entity::find_by_id((
                    message_id.to_string(),
                    actor.profile_id.clone(),
                ))
                .one(&txn)
                .await?;

                if existing.is_none() {
                    message_deletions::ActiveModel {
                        message_id: Set(message_id.to_string()),
                        user_id: Set(actor.profile_id.clone()),
                        deleted_at: Set(now_ms),
                    }
                    .insert(&txn)
                    .await?;
                }
            }
            DeleteMode::ForEveryone => {
                if row.sender_id != actor.profile_id {
                    return Err(ChatError::forbidden(
                        "only the sender can delete a message for everyone",
                    ));
                }

                if !row.is_deleted_for_everyone {
                    let created_at = row.created_at;
                    let mut active: messages::ActiveModel = row.into();
                    active.is_deleted_for_everyone = Set(true);
                    active.content = Set(None);
                    active.metadata_json = Set(None);
                    active.updated_at = Set(now_ms);
                    active.update(&txn).await?;

                    let conversation = store::find_conversation(&txn, &conversation_id).await?;
                    if conversation.last_message_at == Some(created_at) {
                        let mut conv: conversations::ActiveModel = conversation.into();
                        conv.last_message_preview = Set(Some(DELETED_PREVIEW.to_string()));
                        conv.updated_at = Set(now_ms);
                        conv.update(&txn).await?;
                    }
                }
            }
        }

        txn.commit().await?;

        info!(
            message_id = %message_id,
            actor_id = %actor.profile_id,
            mode = %mode,
            "Message deleted"
        );
        self.store.emit(ChatEvent::MessageDeleted {
            conversation_id,
            message_id: message_id.to_string(),
            actor_id: actor.profile_id.clone(),
            mode,
        });

        Ok(())
    }

    /// Load a message as stored, tombstones included
    ///
    /// The viewer must participate in the message's conversation. History
    /// fetches go through [`crate::ReadTracker`] instead, which hides what the
    /// reader should not see.
    pub async fn get_message(&self, viewer: &Identity, message_id: &str) -> ChatResult<Message> {
        let row = store::find_message(&self.store.db, message_id).await?;
        store::require_participant(&self.store.db, &row.conversation_id, &viewer.profile_id)
            .await?;
        store::hydrate_message(&self.store.db, row).await
    }
}

/// Trim and bound-check message text
fn validate_content(content: &str, config: &ChatConfig) -> ChatResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::validation("content is required"));
    }
    if content.chars().count() > config.max_content_length {
        return Err(ChatError::validation(format!(
            "content exceeds max length of {}",
            config.max_content_length
        )));
    }
    Ok(content.to_string())
}

/// Check that content and metadata fit the message type
fn validate_new_message(input: NewMessage, config: &ChatConfig) -> ChatResult<NewMessage> {
    let content = match input.content.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => Some(validate_content(c, config)?),
        _ => None,
    };

    match (input.kind, &input.metadata) {
        (MessageKind::Text, None) => {
            if content.is_none() {
                return Err(ChatError::validation("text messages require content"));
            }
        }
        (MessageKind::Text, Some(_)) => {
            return Err(ChatError::validation("text messages carry no metadata"));
        }
        (MessageKind::Image, Some(MessageMetadata::Image { url })) => {
            if url.trim().is_empty() {
                return Err(ChatError::validation("image url is required"));
            }
        }
        (
            MessageKind::ProjectShare,
            Some(MessageMetadata::ProjectShare {
                project_slug,
                project_name,
            }),
        ) => {
            if project_slug.trim().is_empty() || project_name.trim().is_empty() {
                return Err(ChatError::validation(
                    "project shares require projectSlug and projectName",
                ));
            }
        }
        (kind, _) => {
            return Err(ChatError::validation(format!(
                "metadata does not match message type {}",
                kind
            )));
        }
    }

    Ok(NewMessage {
        kind: input.kind,
        content,
        metadata: input.metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_requires_content() {
        let config = ChatConfig::default();
        assert!(validate_new_message(NewMessage::text("   "), &config).is_err());

        let ok = validate_new_message(NewMessage::text("  hi  "), &config).unwrap();
        assert_eq!(ok.content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_metadata_must_match_kind() {
        let config = ChatConfig::default();
        let mismatched = NewMessage {
            kind: MessageKind::Image,
            content: None,
            metadata: Some(MessageMetadata::ProjectShare {
                project_slug: "gigi".into(),
                project_name: "Gigi".into(),
            }),
        };
        let err = validate_new_message(mismatched, &config).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let missing = NewMessage {
            kind: MessageKind::Image,
            content: Some("caption".into()),
            metadata: None,
        };
        assert!(validate_new_message(missing, &config).is_err());

        let image = NewMessage::image("https://x/y.png", None);
        assert!(validate_new_message(image, &config).is_ok());
    }

    #[test]
    fn test_content_length_limit() {
        let config = ChatConfig {
            max_content_length: 10,
            ..Default::default()
        };
        assert!(validate_content("0123456789", &config).is_ok());
        assert!(validate_content("0123456789a", &config).is_err());
    }
}
