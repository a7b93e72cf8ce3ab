//! Events published by the engine after each committed change
//!
//! A presence or broadcast layer may relay these; nothing in the engine waits
//! on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeleteMode, Message};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageSent {
        conversation_id: String,
        message: Message,
    },
    MessageEdited {
        conversation_id: String,
        message: Message,
    },
    MessageDeleted {
        conversation_id: String,
        message_id: String,
        actor_id: String,
        mode: DeleteMode,
    },
    MessagesDelivered {
        conversation_id: String,
        reader_id: String,
        count: u64,
    },
    ConversationRead {
        conversation_id: String,
        reader_id: String,
        read_at: DateTime<Utc>,
    },
    ConversationCleared {
        conversation_id: String,
        participant_id: String,
        cleared_at: DateTime<Utc>,
    },
    ConversationDeleted {
        conversation_id: String,
        participant_id: String,
        deleted_at: DateTime<Utc>,
    },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> &str {
        match self {
            ChatEvent::MessageSent {
                conversation_id, ..
            }
            | ChatEvent::MessageEdited {
                conversation_id, ..
            }
            | ChatEvent::MessageDeleted {
                conversation_id, ..
            }
            | ChatEvent::MessagesDelivered {
                conversation_id, ..
            }
            | ChatEvent::ConversationRead {
                conversation_id, ..
            }
            | ChatEvent::ConversationCleared {
                conversation_id, ..
            }
            | ChatEvent::ConversationDeleted {
                conversation_id, ..
            } => conversation_id,
        }
    }
}
