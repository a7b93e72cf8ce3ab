//! Session coordinator - what happens when a participant opens, clears or
//! deletes a conversation

use sea_orm::prelude::Expr;
use sea_orm::*;
use tracing::{debug, info};

use crate::clock::from_millis;
use crate::entities::{conversation_participants, messages};
use crate::error::ChatResult;
use crate::events::ChatEvent;
use crate::identity::Identity;
use crate::models::MessageStatus;
use crate::store::{self, ChatStore};

/// Applies per-participant session transitions
#[derive(Clone)]
pub struct SessionCoordinator {
    store: ChatStore,
}

impl SessionCoordinator {
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// Mark the conversation read for `reader`
    ///
    /// In one transaction: moves the read cursor to now, optionally clears the
    /// first-unread marker, and upgrades every message from other senders to
    /// `read` (stamping `delivered_at` first where a message skipped
    /// `delivered`). Calling it again with the same arguments changes nothing.
    pub async fn open_conversation(
        &self,
        conversation_id: &str,
        reader: &Identity,
        clear_unread_marker: bool,
    ) -> ChatResult<()> {
        let now_ms = self.store.now_millis();
        let txn = self.store.db.begin().await?;

        store::find_conversation(&txn, conversation_id).await?;
        let participant =
            store::require_participant(&txn, conversation_id, &reader.profile_id).await?;

        let newest = effective_now(&txn, conversation_id, now_ms).await?;
        let read_at = participant.last_read_at.map_or(newest, |prev| prev.max(newest));
        let needs_update = participant.last_read_at != Some(read_at)
            || (clear_unread_marker && participant.first_unread_message_id.is_some());
        if needs_update {
            let mut active: conversation_participants::ActiveModel = participant.into();
            active.last_read_at = Set(Some(read_at));
            if clear_unread_marker {
                active.first_unread_message_id = Set(None);
            }
            active.update(&txn).await?;
        }

        let delivered = messages::Entity::update_many()
            .col_expr(messages::Column::DeliveredAt, Expr::value(now_ms))
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::SenderId.ne(reader.profile_id.as_str()))
            .filter(messages::Column::DeliveredAt.is_null())
            .exec(&txn)
            .await?;

        let read = messages::Entity::update_many()
            .col_expr(
                messages::Column::Status,
                Expr::value(MessageStatus::Read.as_str()),
            )
            .col_expr(messages::Column::ReadAt, Expr::value(now_ms))
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::SenderId.ne(reader.profile_id.as_str()))
            .filter(messages::Column::Status.ne(MessageStatus::Read.as_str()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        debug!(
            conversation_id = %conversation_id,
            reader_id = %reader.profile_id,
            delivered = delivered.rows_affected,
            read = read.rows_affected,
            clear_unread_marker,
            "Opened conversation"
        );

        self.store.emit(ChatEvent::ConversationRead {
            conversation_id: conversation_id.to_string(),
            reader_id: reader.profile_id.clone(),
            read_at: from_millis(read_at),
        });

        Ok(())
    }

    /// Upgrade messages from other senders from `sent` to `delivered`
    /// without moving the read cursor. Returns how many were upgraded.
    pub async fn mark_delivered(&self, conversation_id: &str, reader: &Identity) -> ChatResult<u64> {
        let now_ms = self.store.now_millis();
        store::find_conversation(&self.store.db, conversation_id).await?;
        store::require_participant(&self.store.db, conversation_id, &reader.profile_id).await?;

        let result = messages::Entity::update_many()
            .col_expr(
                messages::Column::Status,
                Expr::value(MessageStatus::Delivered.as_str()),
            )
            .col_expr(messages::Column::DeliveredAt, Expr::value(now_ms))
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::SenderId.ne(reader.profile_id.as_str()))
            .filter(messages::Column::Status.eq(MessageStatus::Sent.as_str()))
            .exec(&self.store.db)
            .await?;

        if result.rows_affected > 0 {
            debug!(
                conversation_id = %conversation_id,
                reader_id = %reader.profile_id,
                count = result.rows_affected,
                "Marked messages delivered"
            );
            self.store.emit(ChatEvent::MessagesDelivered {
                conversation_id: conversation_id.to_string(),
                reader_id: reader.profile_id.clone(),
                count: result.rows_affected,
            });
        }

        Ok(result.rows_affected)
    }

    /// Hide everything up to now from this participant only
    pub async fn clear_conversation(
        &self,
        conversation_id: &str,
        participant: &Identity,
    ) -> ChatResult<()> {
        let now_ms = self.store.now_millis();
        let txn = self.store.db.begin().await?;

        store::find_conversation(&txn, conversation_id).await?;
        let row = store::require_participant(&txn, conversation_id, &participant.profile_id).await?;

        let now_ms = effective_now(&txn, conversation_id, now_ms).await?;
        let cleared_at = row.cleared_at.map_or(now_ms, |prev| prev.max(now_ms));
        let mut active: conversation_participants::ActiveModel = row.into();
        active.cleared_at = Set(Some(cleared_at));
        active.first_unread_message_id = Set(None);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(
            conversation_id = %conversation_id,
            participant_id = %participant.profile_id,
            "Conversation cleared"
        );
        self.store.emit(ChatEvent::ConversationCleared {
            conversation_id: conversation_id.to_string(),
            participant_id: participant.profile_id.clone(),
            cleared_at: from_millis(cleared_at),
        });

        Ok(())
    }

    /// Remove the conversation from this participant's list until someone
    /// sends a new message
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        participant: &Identity,
    ) -> ChatResult<()> {
        let now_ms = self.store.now_millis();
        let txn = self.store.db.begin().await?;

        store::find_conversation(&txn, conversation_id).await?;
        let row = store::require_participant(&txn, conversation_id, &participant.profile_id).await?;

        let now_ms = effective_now(&txn, conversation_id, now_ms).await?;
        let cleared_at = row.cleared_at.map_or(now_ms, |prev| prev.max(now_ms));
        let mut active: conversation_participants::ActiveModel = row.into();
        active.deleted_at = Set(Some(now_ms));
        active.cleared_at = Set(Some(cleared_at));
        active.first_unread_message_id = Set(None);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(
            conversation_id = %conversation_id,
            participant_id = %participant.profile_id,
            "Conversation deleted for participant"
        );
        self.store.emit(ChatEvent::ConversationDeleted {
            conversation_id: conversation_id.to_string(),
            participant_id: participant.profile_id.clone(),
            deleted_at: from_millis(now_ms),
        });

        Ok(())
    }

    /// Toggle the participant's mute flag
    pub async fn set_muted(
        &self,
        conversation_id: &str,
        participant: &Identity,
        muted: bool,
    ) -> ChatResult<()> {
        store::find_conversation(&self.store.db, conversation_id).await?;
        let row =
            store::require_participant(&self.store.db, conversation_id, &participant.profile_id)
                .await?;
        if row.is_muted != muted {
            let mut active: conversation_participants::ActiveModel = row.into();
            active.is_muted = Set(muted);
            active.update(&self.store.db).await?;
        }
        Ok(())
    }
}

/// "Now" as far as a conversation's history is concerned
///
/// Message stamps may run a few milliseconds ahead of the clock when sends
/// share a millisecond, so cursors and floors never land before the newest
/// message that already exists.
async fn effective_now<C: ConnectionTrait>(
    conn: &C,
    conversation_id: &str,
    now_ms: i64,
) -> ChatResult<i64> {
    let newest = messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .order_by_desc(messages::Column::CreatedAt)
        .one(conn)
        .await?;
    Ok(newest.map_or(now_ms, |m| m.created_at.max(now_ms)))
}
