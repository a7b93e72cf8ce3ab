//! Conversation directory - creating conversations and listing them per user

use std::collections::{BTreeSet, HashMap};

use sea_orm::*;
use tracing::{debug, info};

use crate::entities::{conversation_participants, conversations};
use crate::error::{ChatError, ChatResult};
use crate::identity::Identity;
use crate::models::{Conversation, ConversationSummary, ConversationType, Participant, ParticipantRole};
use crate::store::{self, ChatStore};
use crate::unread::{count_divider, count_unread};

const MAX_GROUP_NAME_LENGTH: usize = 100;

/// Creates conversations and answers "which conversations do I have"
#[derive(Clone)]
pub struct ConversationDirectory {
    store: ChatStore,
}

impl ConversationDirectory {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Get or create the direct conversation between `creator` and
    /// `participant_id`
    pub async fn create_direct(
        &self,
        creator: &Identity,
        participant_id: &str,
    ) -> ChatResult<Conversation> {
        let participant_id = participant_id.trim();
        if participant_id.is_empty() {
            return Err(ChatError::validation("participantId is required"));
        }
        if participant_id == creator.profile_id {
            return Err(ChatError::validation(
                "cannot start a direct conversation with yourself",
            ));
        }

        let key = direct_key(&creator.profile_id, participant_id);
        if let Some(existing) = self.find_by_direct_key(&key).await? {
            debug!(conversation_id = %existing.id, "Direct conversation already exists");
            return Ok(existing);
        }

        let members = [
            (creator.profile_id.as_str(), ParticipantRole::Owner),
            (participant_id, ParticipantRole::Member),
        ];

        match self
            .insert_conversation(
                creator,
                ConversationType::Direct,
                None,
                None,
                Some(key.clone()),
                &members,
            )
            .await
        {
            Ok(conversation) => Ok(conversation),
            Err(ChatError::Storage(e))
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                // Another request created the same pair concurrently
                info!("Direct conversation '{}' created concurrently, reusing it", key);
                self.find_by_direct_key(&key).await?.ok_or_else(|| {
                    ChatError::Internal("direct conversation not found after concurrent insert".into())
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Create a group conversation owned by `creator`
    pub async fn create_group(
        &self,
        creator: &Identity,
        name: &str,
        avatar_url: Option<String>,
        member_ids: &[String],
    ) -> ChatResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::validation("group name is required"));
        }
        if name.chars().count() > MAX_GROUP_NAME_LENGTH {
            return Err(ChatError::validation(format!(
                "group name exceeds max length of {MAX_GROUP_NAME_LENGTH}"
            )));
        }

        let others: BTreeSet<&str> = member_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && *id != creator.profile_id)
            .collect();
        if others.is_empty() {
            return Err(ChatError::validation(
                "a group needs at least one other member",
            ));
        }

        let mut members = vec![(creator.profile_id.as_str(), ParticipantRole::Owner)];
        members.extend(others.into_iter().map(|id| (id, ParticipantRole::Member)));

        let avatar_url = avatar_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        self.insert_conversation(
            creator,
            ConversationType::Group,
            Some(name.to_string()),
            avatar_url,
            None,
            &members,
        )
        .await
    }

    async fn insert_conversation(
        &self,
        creator: &Identity,
        conversation_type: ConversationType,
        name: Option<String>,
        avatar_url: Option<String>,
        direct_key: Option<String>,
        members: &[(&str, ParticipantRole)],
    ) -> ChatResult<Conversation> {
        let now = self.store.now_millis();
        let id = uuid::Uuid::new_v4().to_string();
        let txn = self.store.db.begin().await?;

        let model = conversations::ActiveModel {
            id: Set(id.clone()),
            conversation_type: Set(conversation_type.as_str().to_string()),
            name: Set(name),
            avatar_url: Set(avatar_url),
            created_by_id: Set(creator.profile_id.clone()),
            direct_key: Set(direct_key),
            last_message_at: Set(None),
            last_message_preview: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for &(user_id, role) in members {
            conversation_participants::ActiveModel {
                conversation_id: Set(id.clone()),
                user_id: Set(user_id.to_string()),
                role: Set(role.as_str().to_string()),
                last_read_at: Set(None),
                first_unread_message_id: Set(None),
                is_muted: Set(false),
                cleared_at: Set(None),
                deleted_at: Set(None),
                joined_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(
            conversation_id = %id,
            conversation_type = %conversation_type,
            members = members.len(),
            "Created conversation"
        );
        store::conversation_from_model(model)
    }

    async fn find_by_direct_key(&self, key: &str) -> ChatResult<Option<Conversation>> {
        conversations::Entity::find()
            .filter(conversations::Column::DirectKey.eq(key))
            .one(&self.store.db)
            .await?
            .map(store::conversation_from_model)
            .transpose()
    }

    /// Conversations `reader` has not deleted, most recent activity first
    ///
    /// The divider count is left at zero here; it is only meaningful for the
    /// single-conversation fetch.
    pub async fn list_conversations(&self, reader: &Identity) -> ChatResult<Vec<ConversationSummary>> {
        let rows = conversation_participants::Entity::find()
            .filter(conversation_participants::Column::UserId.eq(reader.profile_id.as_str()))
            .filter(conversation_participants::Column::DeletedAt.is_null())
            .find_also_related(conversations::Entity)
            .all(&self.store.db)
            .await?;

        let conversation_ids: Vec<String> = rows
            .iter()
            .map(|(participant, _)| participant.conversation_id.clone())
            .collect();
        let mut rosters = self.rosters(&conversation_ids).await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (participant, conversation) in rows {
            let Some(conversation) = conversation else {
                continue;
            };
            let unread_count = count_unread(&self.store.db, &participant).await?;
            let participant_ids = rosters.remove(&participant.conversation_id).unwrap_or_default();

            summaries.push(ConversationSummary {
                conversation: store::conversation_from_model(conversation)?,
                participant_ids,
                unread_count,
                first_unread_message_id: participant.first_unread_message_id,
                unread_count_for_divider: 0,
                is_muted: participant.is_muted,
            });
        }

        summaries.sort_by(|a, b| {
            let a_at = a.conversation.last_message_at.unwrap_or(a.conversation.created_at);
            let b_at = b.conversation.last_message_at.unwrap_or(b.conversation.created_at);
            b_at.cmp(&a_at)
        });

        debug!(
            user_id = %reader.profile_id,
            count = summaries.len(),
            "Listed conversations"
        );
        Ok(summaries)
    }

    /// A single conversation as `reader` sees it, divider count included
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
        reader: &Identity,
    ) -> ChatResult<ConversationSummary> {
        let conversation = store::find_conversation(&self.store.db, conversation_id).await?;
        let participant =
            store::require_participant(&self.store.db, conversation_id, &reader.profile_id)
                .await?;

        let unread_count = count_unread(&self.store.db, &participant).await?;
        let unread_count_for_divider = count_divider(&self.store.db, &participant).await?;
        let participant_ids = store::list_participants(&self.store.db, conversation_id)
            .await?
            .into_iter()
            .map(|p| p.user_id)
            .collect();

        Ok(ConversationSummary {
            conversation: store::conversation_from_model(conversation)?,
            participant_ids,
            unread_count,
            first_unread_message_id: participant.first_unread_message_id,
            unread_count_for_divider,
            is_muted: participant.is_muted,
        })
    }

    /// The caller's own participant row
    pub async fn participant_state(
        &self,
        conversation_id: &str,
        participant: &Identity,
    ) -> ChatResult<Participant> {
        store::find_conversation(&self.store.db, conversation_id).await?;
        let row =
            store::require_participant(&self.store.db, conversation_id, &participant.profile_id)
                .await?;
        store::participant_from_model(row)
    }

    /// Every participant of a conversation the caller belongs to
    pub async fn participants(
        &self,
        conversation_id: &str,
        viewer: &Identity,
    ) -> ChatResult<Vec<Participant>> {
        store::find_conversation(&self.store.db, conversation_id).await?;
        store::require_participant(&self.store.db, conversation_id, &viewer.profile_id).await?;
        store::list_participants(&self.store.db, conversation_id)
            .await?
            .into_iter()
            .map(store::participant_from_model)
            .collect()
    }

    async fn rosters(&self, conversation_ids: &[String]) -> ChatResult<HashMap<String, Vec<String>>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut rosters: HashMap<String, Vec<String>> = HashMap::new();
        for row in conversation_participants::Entity::find()
            .filter(
                conversation_participants::Column::ConversationId
                    .is_in(conversation_ids.iter().cloned()),
            )
            .order_by_asc(conversation_participants::Column::JoinedAt)
            .all(&self.store.db)
            .await?
        {
            rosters.entry(row.conversation_id).or_default().push(row.user_id);
        }
        Ok(rosters)
    }
}

/// Order-independent key for the pair of users in a direct conversation
pub(crate) fn direct_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}
