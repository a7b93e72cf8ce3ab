//! The calls a conversation view makes against the chat service

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigi_chat::{
    ChatApi, ChatResult, ConversationSummary, DeleteMode, Message, MessagePage, NewMessage,
};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_message(&self, conversation_id: &str, input: NewMessage) -> ChatResult<Message>;

    async fn edit_message(&self, message_id: &str, content: &str) -> ChatResult<Message>;

    async fn delete_message(&self, message_id: &str, mode: DeleteMode) -> ChatResult<()>;

    async fn open_conversation(
        &self,
        conversation_id: &str,
        clear_unread_marker: bool,
    ) -> ChatResult<()>;

    async fn get_messages(
        &self,
        conversation_id: &str,
        before: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> ChatResult<MessagePage>;

    async fn get_conversation(&self, conversation_id: &str) -> ChatResult<ConversationSummary>;
}

#[async_trait]
impl ChatBackend for ChatApi {
    async fn send_message(&self, conversation_id: &str, input: NewMessage) -> ChatResult<Message> {
        ChatApi::send_message(self, conversation_id, input).await
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> ChatResult<Message> {
        ChatApi::edit_message(self, message_id, content).await
    }

    async fn delete_message(&self, message_id: &str, mode: DeleteMode) -> ChatResult<()> {
        ChatApi::delete_message(self, message_id, mode).await
    }

    async fn open_conversation(
        &self,
        conversation_id: &str,
        clear_unread_marker: bool,
    ) -> ChatResult<()> {
        ChatApi::open_conversation(self, conversation_id, clear_unread_marker).await
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        before: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> ChatResult<MessagePage> {
        ChatApi::get_messages(self, conversation_id, before, limit).await
    }

    async fn get_conversation(&self, conversation_id: &str) -> ChatResult<ConversationSummary> {
        ChatApi::get_conversation(self, conversation_id).await
    }
}
