//! Read tracker - unread counts, the divider count, and paged history
//!
//! Counts are always derived from message rows and the participant's cursor
//! fields; the conversation's last-message cache plays no part.

use chrono::{DateTime, Utc};
use sea_orm::*;
use tracing::debug;

use crate::clock::to_millis;
use crate::entities::{conversation_participants, messages};
use crate::error::ChatResult;
use crate::identity::Identity;
use crate::models::MessagePage;
use crate::store::{self, ChatStore};

/// Computes unread state and serves visible history
#[derive(Clone)]
pub struct ReadTracker {
    store: ChatStore,
}

impl ReadTracker {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Messages from other senders after the reader's read cursor
    pub async fn unread_count(&self, conversation_id: &str, reader: &Identity) -> ChatResult<u64> {
        store::find_conversation(&self.store.db, conversation_id).await?;
        let participant =
            store::require_participant(&self.store.db, conversation_id, &reader.profile_id)
                .await?;
        count_unread(&self.store.db, &participant).await
    }

    /// Size of the "N unread messages" divider, counted from the first-unread
    /// marker. Zero when no marker is set.
    pub async fn divider_count(&self, conversation_id: &str, reader: &Identity) -> ChatResult<u64> {
        store::find_conversation(&self.store.db, conversation_id).await?;
        let participant =
            store::require_participant(&self.store.db, conversation_id, &reader.profile_id)
                .await?;
        count_divider(&self.store.db, &participant).await
    }

    /// Sum of unread counts over every conversation the reader has not deleted
    pub async fn unread_total(&self, reader: &Identity) -> ChatResult<u64> {
        let participations = conversation_participants::Entity::find()
            .filter(conversation_participants::Column::UserId.eq(reader.profile_id.as_str()))
            .filter(conversation_participants::Column::DeletedAt.is_null())
            .all(&self.store.db)
            .await?;

        let mut total = 0;
        for participant in &participations {
            total += count_unread(&self.store.db, participant).await?;
        }

        debug!(
            user_id = %reader.profile_id,
            conversations = participations.len(),
            total,
            "Computed unread total"
        );
        Ok(total)
    }

    /// One page of history visible to `reader`, oldest first
    ///
    /// Without `before` the newest page is returned; with it, the page of
    /// messages strictly older than `before`.
    pub async fn fetch_messages(
        &self,
        conversation_id: &str,
        reader: &Identity,
        before: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> ChatResult<MessagePage> {
        store::find_conversation(&self.store.db, conversation_id).await?;
        let participant =
            store::require_participant(&self.store.db, conversation_id, &reader.profile_id)
                .await?;
        let limit = self.store.config.page_size(limit);

        let mut query = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(store::visible_to(&participant));
        if let Some(before) = before {
            query = query.filter(messages::Column::CreatedAt.lt(to_millis(before)));
        }

        // One extra row tells us whether an older page exists
        let mut rows = query
            .order_by_desc(messages::Column::CreatedAt)
            .limit(limit + 1)
            .all(&self.store.db)
            .await?;

        let has_more = rows.len() as u64 > limit;
        rows.truncate(limit as usize);
        rows.reverse();

        let messages = store::hydrate_messages(&self.store.db, rows).await?;
        debug!(
            conversation_id = %conversation_id,
            reader_id = %reader.profile_id,
            count = messages.len(),
            has_more,
            "Fetched messages"
        );

        Ok(MessagePage { messages, has_more })
    }
}

fn from_others(participant: &conversation_participants::Model) -> Select<messages::Entity> {
    messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(participant.conversation_id.as_str()))
        .filter(messages::Column::SenderId.ne(participant.user_id.as_str()))
        .filter(store::visible_to(participant))
}

pub(crate) async fn count_unread<C: ConnectionTrait>(
    conn: &C,
    participant: &conversation_participants::Model,
) -> ChatResult<u64> {
    let mut query = from_others(participant);
    if let Some(last_read_at) = participant.last_read_at {
        query = query.filter(messages::Column::CreatedAt.gt(last_read_at));
    }
    Ok(query.count(conn).await?)
}

pub(crate) async fn count_divider<C: ConnectionTrait>(
    conn: &C,
    participant: &conversation_participants::Model,
) -> ChatResult<u64> {
    let Some(first_unread_id) = participant.first_unread_message_id.as_deref() else {
        return Ok(0);
    };
    let Some(first_unread) = messages::Entity::find_by_id(first_unread_id.to_string())
        .one(conn)
        .await?
    else {
        return Ok(0);
    };

    Ok(from_others(participant)
        .filter(messages::Column::CreatedAt.gte(first_unread.created_at))
        .count(conn)
        .await?)
}
