//! Optimistic view of one open conversation
//!
//! Every mutation is applied locally first and then settled against the
//! service. A successful send replaces its provisional entry in place, a
//! failed one stays in the list marked `failed` until it is retried or
//! discarded. Failed edits and deletes put the original message back and
//! hand the error to the caller.

use std::sync::Arc;

use gigi_chat::{
    within_edit_window, ChatError, ChatEvent, ChatResult, Clock, DeleteMode, ErrorBody, Message,
    MessageStatus, NewMessage, PresenceChannel, PresenceScope, SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;
use crate::error::{ClientError, ClientResult};
use crate::overlay::{self, PendingOp, PendingOps};
use crate::presence::PresenceAttachment;

/// "N unread messages" marker, counted once when the view opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadDivider {
    pub message_id: String,
    pub count: u64,
}

pub struct ConversationView {
    backend: Arc<dyn ChatBackend>,
    clock: Arc<dyn Clock>,
    conversation_id: String,
    me: String,
    messages: Vec<Message>,
    pending: PendingOps,
    has_more: bool,
    page_size: Option<u64>,
    divider: Option<UnreadDivider>,
    last_error: Option<ErrorBody>,
    presence: Option<PresenceAttachment>,
}

impl ConversationView {
    /// Open a conversation: freeze the divider, load the newest page and
    /// move the read cursor. The first-unread marker stays on the server
    /// until a new message clears it.
    pub async fn open(
        backend: Arc<dyn ChatBackend>,
        conversation_id: impl Into<String>,
        me: impl Into<String>,
    ) -> ClientResult<Self> {
        Self::open_with_clock(backend, conversation_id, me, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        backend: Arc<dyn ChatBackend>,
        conversation_id: impl Into<String>,
        me: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> ClientResult<Self> {
        let mut view = Self {
            backend,
            clock,
            conversation_id: conversation_id.into(),
            me: me.into(),
            messages: Vec::new(),
            pending: PendingOps::new(),
            has_more: false,
            page_size: None,
            divider: None,
            last_error: None,
            presence: None,
        };

        let summary = view.backend.get_conversation(&view.conversation_id).await?;
        view.divider = match summary.first_unread_message_id {
            Some(message_id) if summary.unread_count_for_divider > 0 => Some(UnreadDivider {
                message_id,
                count: summary.unread_count_for_divider,
            }),
            _ => None,
        };

        view.load().await?;
        view.backend
            .open_conversation(&view.conversation_id, false)
            .await?;

        debug!(
            conversation_id = %view.conversation_id,
            messages = view.messages.len(),
            divider = ?view.divider,
            "Opened conversation view"
        );
        Ok(view)
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Messages as rendered, oldest first, provisional sends included
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn divider(&self) -> Option<&UnreadDivider> {
        self.divider.as_ref()
    }

    /// The most recent failure of an optimistic operation
    pub fn last_error(&self) -> Option<&ErrorBody> {
        self.last_error.as_ref()
    }

    pub fn pending(&self) -> &PendingOps {
        &self.pending
    }

    /// Reload the newest page, keeping unsettled and failed sends at the end
    pub async fn load(&mut self) -> ClientResult<()> {
        let page = self
            .backend
            .get_messages(&self.conversation_id, None, self.page_size)
            .await?;

        let provisional: Vec<Message> = self
            .pending
            .sends()
            .iter()
            .filter_map(|id| self.message(id).cloned())
            .collect();

        self.messages = page.messages;
        self.has_more = page.has_more;
        self.messages.extend(provisional);
        Ok(())
    }

    /// Prepend the page before the oldest loaded message. Returns how many
    /// messages were added.
    pub async fn load_older(&mut self) -> ClientResult<usize> {
        if !self.has_more {
            return Ok(0);
        }
        let Some(oldest) = self
            .messages
            .iter()
            .find(|m| !overlay::is_provisional(&m.id))
            .map(|m| m.created_at)
        else {
            return Ok(0);
        };

        let page = self
            .backend
            .get_messages(&self.conversation_id, Some(oldest), self.page_size)
            .await?;
        let added = page.messages.len();
        self.has_more = page.has_more;
        self.messages.splice(0..0, page.messages);
        Ok(added)
    }

    /// Put a provisional message into the view and return its id
    pub fn begin_send(&mut self, input: NewMessage) -> String {
        let now = self.clock.now();
        let id = overlay::provisional_id();
        self.messages.push(Message {
            id: id.clone(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.me.clone(),
            kind: input.kind,
            content: input.content.clone(),
            metadata: input.metadata.clone(),
            status: MessageStatus::Sending,
            is_edited: false,
            deleted_for_user_ids: Default::default(),
            is_deleted_for_everyone: false,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            read_at: None,
        });
        self.pending.begin_send(&id, input);
        id
    }

    /// Apply the outcome of a send started with [`Self::begin_send`]
    pub async fn settle_send(
        &mut self,
        provisional_id: &str,
        outcome: ChatResult<Message>,
    ) -> ClientResult<Message> {
        let Some(index) = self.position(provisional_id) else {
            return Err(ClientError::UnknownMessage(provisional_id.to_string()));
        };

        match outcome {
            Ok(message) => {
                self.pending.remove(provisional_id);
                // The echo of this send may already be in the view
                if let Some(existing) = self.position(&message.id) {
                    self.messages[existing] = message.clone();
                    self.messages.remove(index);
                } else {
                    self.messages[index] = message.clone();
                }
                debug!(
                    provisional_id = %provisional_id,
                    message_id = %message.id,
                    "Send settled"
                );
                self.clear_divider().await?;
                Ok(message)
            }
            Err(e) => {
                let body = ErrorBody::from(&e);
                warn!(
                    provisional_id = %provisional_id,
                    code = %body.code,
                    "Send failed: {}",
                    body.message
                );
                self.messages[index].status = MessageStatus::Failed;
                self.pending.mark_send_failed(provisional_id, body.clone());
                self.last_error = Some(body);
                Err(e.into())
            }
        }
    }

    /// Send a message optimistically
    pub async fn send(&mut self, input: NewMessage) -> ClientResult<Message> {
        let provisional_id = self.begin_send(input.clone());
        let outcome = self
            .backend
            .send_message(&self.conversation_id, input)
            .await;
        self.settle_send(&provisional_id, outcome).await
    }

    /// Re-issue a failed send with the same content
    pub async fn retry(&mut self, provisional_id: &str) -> ClientResult<Message> {
        let input = self
            .pending
            .failed_send(provisional_id)
            .cloned()
            .ok_or_else(|| ClientError::NothingToRetry(provisional_id.to_string()))?;

        if let Some(index) = self.position(provisional_id) {
            self.messages[index].status = MessageStatus::Sending;
        }
        self.pending.mark_send_in_flight(provisional_id);
        info!(provisional_id = %provisional_id, "Retrying send");

        let outcome = self
            .backend
            .send_message(&self.conversation_id, input)
            .await;
        self.settle_send(provisional_id, outcome).await
    }

    /// Drop a failed send from the view
    pub fn discard(&mut self, provisional_id: &str) -> ClientResult<()> {
        if self.pending.failed_send(provisional_id).is_none() {
            return Err(ClientError::NothingToRetry(provisional_id.to_string()));
        }
        self.pending.remove(provisional_id);
        self.messages.retain(|m| m.id != provisional_id);
        Ok(())
    }

    /// Advisory check for enabling the edit action. The service decides.
    pub fn can_edit(&self, message_id: &str) -> bool {
        self.message(message_id).is_some_and(|m| {
            !overlay::is_provisional(&m.id)
                && !m.is_deleted_for_everyone
                && m.can_edit(&self.me, self.clock.now())
        })
    }

    /// Edit optimistically, restoring the original on failure
    pub async fn edit(&mut self, message_id: &str, content: &str) -> ClientResult<Message> {
        let index = self.settled_position(message_id)?;
        let original = self.messages[index].clone();
        if original.sender_id != self.me {
            return Err(ClientError::NotSender(message_id.to_string()));
        }
        if !within_edit_window(original.created_at, self.clock.now()) {
            return Err(ClientError::EditWindowClosed(message_id.to_string()));
        }

        let content = content.trim();
        if original.content.as_deref().map(str::trim) != Some(content) {
            let entry = &mut self.messages[index];
            entry.content = Some(content.to_string());
            entry.is_edited = true;
        }
        self.pending.begin_edit(original);

        let outcome = self.backend.edit_message(message_id, content).await;
        let restore = self.pending.remove(message_id);
        match outcome {
            Ok(message) => {
                if let Some(index) = self.position(message_id) {
                    self.messages[index] = message.clone();
                }
                Ok(message)
            }
            Err(e) => {
                if let (Some(PendingOp::Edit { original }), Some(index)) =
                    (restore, self.position(message_id))
                {
                    self.messages[index] = original;
                }
                Err(self.record(e))
            }
        }
    }

    /// Delete optimistically, restoring the message on failure
    pub async fn delete(&mut self, message_id: &str, mode: DeleteMode) -> ClientResult<()> {
        let index = self.settled_position(message_id)?;
        let original = self.messages.remove(index);
        self.pending.begin_delete(original, index, mode);

        let outcome = self.backend.delete_message(message_id, mode).await;
        let restore = self.pending.remove(message_id);
        match outcome {
            Ok(()) => {
                debug!(message_id = %message_id, mode = %mode, "Delete settled");
                Ok(())
            }
            Err(e) => {
                if let Some(PendingOp::Delete {
                    original, index, ..
                }) = restore
                {
                    let index = index.min(self.messages.len());
                    self.messages.insert(index, original);
                }
                Err(self.record(e))
            }
        }
    }

    /// A message arrived for this conversation, from anyone
    ///
    /// Returns whether the view changed. A new message clears the unread
    /// divider and marks the conversation read with the service.
    pub async fn receive(&mut self, message: Message) -> ClientResult<bool> {
        if message.conversation_id != self.conversation_id {
            return Ok(false);
        }
        if let Some(index) = self.position(&message.id) {
            self.messages[index] = message;
            return Ok(true);
        }
        if !message.is_visible_to(&self.me) {
            return Ok(false);
        }

        // Settled messages sit before provisional ones, in time order
        let index = self
            .messages
            .iter()
            .position(|m| overlay::is_provisional(&m.id) || m.created_at > message.created_at)
            .unwrap_or(self.messages.len());
        let from_other = message.sender_id != self.me;
        self.messages.insert(index, message);

        if from_other {
            self.divider = None;
            if let Err(e) = self.backend.open_conversation(&self.conversation_id, true).await {
                return Err(self.record(e));
            }
        } else {
            self.clear_divider().await?;
        }
        Ok(true)
    }

    /// Fold an engine event into the view
    pub async fn apply_event(&mut self, event: ChatEvent) -> ClientResult<bool> {
        if event.conversation_id() != self.conversation_id {
            return Ok(false);
        }
        match event {
            ChatEvent::MessageSent { message, .. } => self.receive(message).await,
            ChatEvent::MessageEdited { message, .. } => match self.position(&message.id) {
                Some(index) => {
                    self.messages[index] = message;
                    Ok(true)
                }
                None => Ok(false),
            },
            ChatEvent::MessageDeleted {
                message_id,
                actor_id,
                mode,
                ..
            } => {
                let hides = mode == DeleteMode::ForEveryone || actor_id == self.me;
                let before = self.messages.len();
                if hides {
                    self.messages.retain(|m| m.id != message_id);
                }
                Ok(self.messages.len() != before)
            }
            ChatEvent::ConversationCleared { participant_id, .. }
            | ChatEvent::ConversationDeleted { participant_id, .. }
                if participant_id == self.me =>
            {
                self.messages.retain(|m| overlay::is_provisional(&m.id));
                self.has_more = false;
                self.divider = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Hide the divider and confirm with the service
    pub async fn dismiss_divider(&mut self) -> ClientResult<()> {
        self.clear_divider().await
    }

    /// Subscribe to online state for this conversation. Without a working
    /// presence channel the view simply has no indicator.
    pub fn attach_presence(&mut self, channel: &dyn PresenceChannel) -> bool {
        self.presence = PresenceAttachment::attach(
            channel,
            PresenceScope::Conversation(self.conversation_id.clone()),
            &self.me,
            self.clock.now(),
        );
        self.presence.is_some()
    }

    /// `None` when no presence indicator is available
    pub fn is_online(&self, profile_id: &str) -> Option<bool> {
        self.presence.as_ref().map(|p| p.is_online(profile_id))
    }

    async fn clear_divider(&mut self) -> ClientResult<()> {
        if self.divider.take().is_some() {
            if let Err(e) = self.backend.open_conversation(&self.conversation_id, true).await {
                return Err(self.record(e));
            }
        }
        Ok(())
    }

    fn record(&mut self, e: ChatError) -> ClientError {
        let body = ErrorBody::from(&e);
        warn!(
            conversation_id = %self.conversation_id,
            code = %body.code,
            "Operation failed: {}",
            body.message
        );
        self.last_error = Some(body);
        e.into()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    fn settled_position(&self, message_id: &str) -> ClientResult<usize> {
        if overlay::is_provisional(message_id) {
            return Err(ClientError::NotSent(message_id.to_string()));
        }
        self.position(message_id)
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))
    }
}
