//! RPC facade
//!
//! Every call resolves the caller through the [`IdentityProvider`] first and
//! answers `Unauthorized` when there is nobody logged in. The components it
//! wraps take the identity explicitly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::conversations::ConversationDirectory;
use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::identity::{Identity, IdentityProvider};
use crate::lifecycle::MessageLifecycle;
use crate::models::{
    Conversation, ConversationSummary, DeleteMode, Message, MessagePage, NewMessage, Participant,
};
use crate::session::SessionCoordinator;
use crate::store::ChatStore;
use crate::unread::ReadTracker;

/// Conversation and message operations on behalf of the current profile
#[derive(Clone)]
pub struct ChatApi {
    store: ChatStore,
    identity: Arc<dyn IdentityProvider>,
    directory: ConversationDirectory,
    lifecycle: MessageLifecycle,
    tracker: ReadTracker,
    session: SessionCoordinator,
}

impl ChatApi {
    pub fn new(store: ChatStore, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            directory: ConversationDirectory::new(store.clone()),
            lifecycle: MessageLifecycle::new(store.clone()),
            tracker: ReadTracker::new(store.clone()),
            session: SessionCoordinator::new(store.clone()),
            identity,
            store,
        }
    }

    async fn caller(&self) -> ChatResult<Identity> {
        self.identity
            .current_profile()
            .await
            .ok_or(ChatError::Unauthorized)
    }

    /// The profile calls are made as, if any
    pub async fn current_profile(&self) -> Option<Identity> {
        self.identity.current_profile().await
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub async fn create_direct_conversation(&self, participant_id: &str) -> ChatResult<Conversation> {
        let me = self.caller().await?;
        self.directory.create_direct(&me, participant_id).await
    }

    pub async fn create_group_conversation(
        &self,
        name: &str,
        avatar_url: Option<String>,
        member_ids: &[String],
    ) -> ChatResult<Conversation> {
        let me = self.caller().await?;
        self.directory
            .create_group(&me, name, avatar_url, member_ids)
            .await
    }

    pub async fn send_message(&self, conversation_id: &str, input: NewMessage) -> ChatResult<Message> {
        let me = self.caller().await?;
        self.lifecycle.send(&me, conversation_id, input).await
    }

    pub async fn get_messages(
        &self,
        conversation_id: &str,
        before: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> ChatResult<MessagePage> {
        let me = self.caller().await?;
        self.tracker
            .fetch_messages(conversation_id, &me, before, limit)
            .await
    }

    pub async fn get_message(&self, message_id: &str) -> ChatResult<Message> {
        let me = self.caller().await?;
        self.lifecycle.get_message(&me, message_id).await
    }

    pub async fn edit_message(&self, message_id: &str, content: &str) -> ChatResult<Message> {
        let me = self.caller().await?;
        self.lifecycle.edit(&me, message_id, content).await
    }

    pub async fn delete_message(&self, message_id: &str, mode: DeleteMode) -> ChatResult<()> {
        let me = self.caller().await?;
        self.lifecycle.delete(&me, message_id, mode).await
    }

    pub async fn open_conversation(
        &self,
        conversation_id: &str,
        clear_unread_marker: bool,
    ) -> ChatResult<()> {
        let me = self.caller().await?;
        self.session
            .open_conversation(conversation_id, &me, clear_unread_marker)
            .await
    }

    pub async fn mark_delivered(&self, conversation_id: &str) -> ChatResult<u64> {
        let me = self.caller().await?;
        self.session.mark_delivered(conversation_id, &me).await
    }

    pub async fn clear_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        let me = self.caller().await?;
        self.session.clear_conversation(conversation_id, &me).await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        let me = self.caller().await?;
        self.session.delete_conversation(conversation_id, &me).await
    }

    pub async fn set_muted(&self, conversation_id: &str, muted: bool) -> ChatResult<()> {
        let me = self.caller().await?;
        self.session.set_muted(conversation_id, &me, muted).await
    }

    pub async fn list_conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        let me = self.caller().await?;
        self.directory.list_conversations(&me).await
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> ChatResult<ConversationSummary> {
        let me = self.caller().await?;
        self.directory.get_conversation(conversation_id, &me).await
    }

    pub async fn get_unread_total(&self) -> ChatResult<u64> {
        let me = self.caller().await?;
        self.tracker.unread_total(&me).await
    }

    /// The caller's own participant row
    pub async fn my_participation(&self, conversation_id: &str) -> ChatResult<Participant> {
        let me = self.caller().await?;
        self.directory.participant_state(conversation_id, &me).await
    }

    pub async fn participants(&self, conversation_id: &str) -> ChatResult<Vec<Participant>> {
        let me = self.caller().await?;
        self.directory.participants(conversation_id, &me).await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.store.subscribe_events()
    }
}
