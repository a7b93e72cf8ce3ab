//! Gigi Chat - conversation and message lifecycle engine
//!
//! This crate owns everything behind Gigi's direct messages: creating
//! conversations, ordering and delivering messages, per-participant read and
//! unread state, the five-minute edit window, and "for me" / "for everyone"
//! deletes. State lives in SQLite through Sea-ORM.
//!
//! # Architecture
//!
//! - **ChatStore**: connection, migrations, clock, event fan-out and the shared
//!   reader-visibility predicate
//! - **ConversationDirectory**: direct/group creation and conversation lists
//! - **MessageLifecycle**: send, edit (within the window) and delete
//! - **ReadTracker**: unread counts, the frozen divider count and paged history
//! - **SessionCoordinator**: open/clear/delete a conversation for one participant
//! - **ChatApi**: the RPC surface, resolving the caller through an
//!   [`IdentityProvider`]
//!
//! # Database Schema
//!
//! - `conversations`: type, group name/avatar, last message cache
//! - `conversation_participants`: role, read cursor, first-unread marker,
//!   visibility floor and soft delete, keyed by (conversation, user)
//! - `messages`: content, typed metadata, delivery status, tombstone flag
//! - `message_deletions`: "deleted for me" markers
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use gigi_chat::{ChatApi, ChatConfig, ChatStore, Identity, NewMessage, StaticIdentityProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ChatStore::open(ChatConfig {
//!     db_path: "chat.db".into(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let alice = Arc::new(StaticIdentityProvider::new(Identity::new("alice-id", "alice")));
//! let api = ChatApi::new(store, alice);
//!
//! let conversation = api.create_direct_conversation("bob-id").await?;
//! api.send_message(&conversation.id, NewMessage::text("hi")).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod clock;
pub mod conversations;
pub mod entities;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod migration;
pub mod models;
pub mod presence;
pub mod session;
pub mod store;
pub mod unread;

pub use api::ChatApi;
pub use clock::{Clock, ManualClock, SystemClock};
pub use conversations::ConversationDirectory;
pub use error::{ChatError, ChatResult, ErrorBody, ErrorCode};
pub use events::ChatEvent;
pub use identity::{Identity, IdentityProvider, StaticIdentityProvider};
pub use lifecycle::MessageLifecycle;
pub use models::{
    preview_for, truncate_preview, within_edit_window, Conversation, ConversationSummary,
    ConversationType, DeleteMode, Message, MessageKind, MessageMetadata, MessagePage,
    MessageStatus, NewMessage, Participant, ParticipantRole, DELETED_PREVIEW,
    EDIT_WINDOW_SECONDS,
};
pub use presence::{
    LocalPresenceHub, PresenceCallback, PresenceChannel, PresenceScope, PresenceState,
    PresenceSubscription,
};
pub use session::SessionCoordinator;
pub use store::ChatStore;
pub use unread::ReadTracker;

/// Configuration for the chat engine
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Page size when a history request gives none (default: 30)
    pub default_page_size: u64,

    /// Largest page a history request may ask for (default: 100)
    pub max_page_size: u64,

    /// Maximum message content length in characters (default: 4000)
    pub max_content_length: usize,

    /// Maximum length of the conversation list preview (default: 100)
    pub preview_max_chars: usize,

    /// Extra attempts for a send that hits a busy database (default: 3)
    pub max_busy_retries: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("gigi-chat.db"),
            default_page_size: 30,
            max_page_size: 100,
            max_content_length: 4000,
            preview_max_chars: 100,
            max_busy_retries: 3,
        }
    }
}

impl ChatConfig {
    /// Resolve a requested page size against the configured bounds
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
