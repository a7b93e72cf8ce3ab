//! Domain types for conversations, participants and messages

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Messages may be edited by their sender for this long after creation.
/// Shared by the server check and the client pre-check.
pub const EDIT_WINDOW_SECONDS: i64 = 5 * 60;

/// Preview text shown in the conversation list once the latest message is
/// deleted for everyone
pub const DELETED_PREVIEW: &str = "Message deleted";

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ChatError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(ChatError::Internal(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

/// Conversation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Direct,
    Group,
}

string_enum!(ConversationType {
    Direct => "direct",
    Group => "group",
});

/// Participant role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Owner,
    Admin,
    Member,
}

string_enum!(ParticipantRole {
    Owner => "owner",
    Admin => "admin",
    Member => "member",
});

/// Message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    ProjectShare,
}

string_enum!(MessageKind {
    Text => "text",
    Image => "image",
    ProjectShare => "project_share",
});

/// Delivery status
///
/// `Sending` and `Failed` only ever exist in a client's local view; the store
/// persists `Sent`, `Delivered` and `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

string_enum!(MessageStatus {
    Sending => "sending",
    Sent => "sent",
    Delivered => "delivered",
    Read => "read",
    Failed => "failed",
});

impl MessageStatus {
    pub fn is_client_local(&self) -> bool {
        matches!(self, MessageStatus::Sending | MessageStatus::Failed)
    }
}

/// Delete semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    ForMe,
    ForEveryone,
}

string_enum!(DeleteMode {
    ForMe => "for_me",
    ForEveryone => "for_everyone",
});

/// Typed payload carried next to a message's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageMetadata {
    Image {
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    ProjectShare {
        project_slug: String,
        project_name: String,
    },
}

impl MessageMetadata {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageMetadata::Image { .. } => MessageKind::Image,
            MessageMetadata::ProjectShare { .. } => MessageKind::ProjectShare,
        }
    }
}

/// Input for a new message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub metadata: Option<MessageMetadata>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: Some(content.into()),
            metadata: None,
        }
    }

    pub fn image(url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            kind: MessageKind::Image,
            content: caption,
            metadata: Some(MessageMetadata::Image { url: url.into() }),
        }
    }

    pub fn project_share(
        project_slug: impl Into<String>,
        project_name: impl Into<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            kind: MessageKind::ProjectShare,
            content: note,
            metadata: Some(MessageMetadata::ProjectShare {
                project_slug: project_slug.into(),
                project_name: project_name.into(),
            }),
        }
    }
}

/// Conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by_id: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user membership and read state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub conversation_id: String,
    pub user_id: String,
    pub role: ParticipantRole,
    pub last_read_at: Option<DateTime<Utc>>,
    pub first_unread_message_id: Option<String>,
    pub is_muted: bool,
    pub cleared_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

/// Message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub metadata: Option<MessageMetadata>,
    pub status: MessageStatus,
    pub is_edited: bool,
    pub deleted_for_user_ids: BTreeSet<String>,
    pub is_deleted_for_everyone: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether `reader_id` may see this message at all
    pub fn is_visible_to(&self, reader_id: &str) -> bool {
        !self.is_deleted_for_everyone && !self.deleted_for_user_ids.contains(reader_id)
    }

    /// Whether `editor_id` may still edit this message at `now`
    pub fn can_edit(&self, editor_id: &str, now: DateTime<Utc>) -> bool {
        self.sender_id == editor_id && within_edit_window(self.created_at, now)
    }
}

/// True while `now - created_at` has not passed [`EDIT_WINDOW_SECONDS`].
/// Exactly five minutes is still inside the window.
pub fn within_edit_window(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(created_at) <= chrono::Duration::seconds(EDIT_WINDOW_SECONDS)
}

/// One page of a conversation's history, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// A conversation as seen by one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub participant_ids: Vec<String>,
    pub unread_count: u64,
    pub first_unread_message_id: Option<String>,
    /// Only computed for the single-conversation fetch; zero in list views
    pub unread_count_for_divider: u64,
    pub is_muted: bool,
}

/// Build the list-view preview for a message body
pub fn preview_for(
    kind: MessageKind,
    content: Option<&str>,
    metadata: Option<&MessageMetadata>,
    max_chars: usize,
) -> String {
    let text = content.map(str::trim).filter(|c| !c.is_empty());
    let raw = match (kind, metadata) {
        (MessageKind::Text, _) => text.unwrap_or_default().to_string(),
        (MessageKind::Image, _) => match text {
            Some(caption) => format!("[Image] {caption}"),
            None => "[Image]".to_string(),
        },
        (MessageKind::ProjectShare, Some(MessageMetadata::ProjectShare { project_name, .. })) => {
            format!("Shared a project: {project_name}")
        }
        (MessageKind::ProjectShare, _) => "Shared a project".to_string(),
    };
    truncate_preview(&raw, max_chars)
}

/// Cap `text` at `max_chars` characters, cutting at `max_chars - 3` and
/// appending "..." when it is longer.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
