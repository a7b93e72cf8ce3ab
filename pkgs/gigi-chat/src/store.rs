//! Entity store - SQLite persistence for conversations, participants and messages
//!
//! Holds the shared connection, clock, config and event fan-out that the
//! lifecycle manager, read tracker, session coordinator and directory all work
//! through. Reader visibility is applied here as an explicit query predicate;
//! message rows themselves are reader-agnostic and never physically removed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Context;
use sea_orm::sea_query::Query;
use sea_orm::*;
use sea_orm_migration::MigratorTrait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::clock::{from_millis, Clock, SystemClock};
use crate::entities::{conversation_participants, conversations, message_deletions, messages};
use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::models::{Conversation, Message, MessageMetadata, Participant};
use crate::ChatConfig;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared handle to the conversation database
#[derive(Clone)]
pub struct ChatStore {
    pub(crate) db: DatabaseConnection,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: ChatConfig,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatStore {
    /// Open (or create) the database at `config.db_path` and run migrations
    pub async fn open(config: ChatConfig) -> anyhow::Result<Self> {
        let db_path_str = config
            .db_path
            .to_str()
            .context("Invalid database path")?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

        let db: DatabaseConnection = Database::connect(db_url.as_str())
            .await
            .context("Failed to connect to database")?;

        crate::migration::Migrator::up(&db, None)
            .await
            .context("Failed to run migrations")?;

        info!("Chat store initialized at {}", config.db_path.display());

        Ok(Self::with_connection(db, config))
    }

    /// Create a store over an existing, already migrated connection
    pub fn with_connection(db: DatabaseConnection, config: ChatConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            clock: Arc::new(SystemClock),
            config,
            events,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Receive every event the engine publishes from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        // No receivers is the normal case when nothing relays events.
        if self.events.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    pub(crate) fn now_millis(&self) -> i64 {
        crate::clock::to_millis(self.clock.now())
    }
}

pub(crate) async fn find_conversation<C: ConnectionTrait>(
    conn: &C,
    conversation_id: &str,
) -> ChatResult<conversations::Model> {
    conversations::Entity::find_by_id(conversation_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))
}

pub(crate) async fn find_participant<C: ConnectionTrait>(
    conn: &C,
    conversation_id: &str,
    user_id: &str,
) -> ChatResult<Option<conversation_participants::Model>> {
    Ok(
        conversation_participants::Entity::find_by_id((
            conversation_id.to_string(),
            user_id.to_string(),
        ))
        .one(conn)
        .await?,
    )
}

/// Membership check shared by every participant-only operation
pub(crate) async fn require_participant<C: ConnectionTrait>(
    conn: &C,
    conversation_id: &str,
    user_id: &str,
) -> ChatResult<conversation_participants::Model> {
    find_participant(conn, conversation_id, user_id)
        .await?
        .ok_or_else(|| {
            ChatError::forbidden(format!(
                "{} is not a participant in conversation {}",
                user_id, conversation_id
            ))
        })
}

pub(crate) async fn find_message<C: ConnectionTrait>(
    conn: &C,
    message_id: &str,
) -> ChatResult<messages::Model> {
    messages::Entity::find_by_id(message_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))
}

pub(crate) async fn list_participants<C: ConnectionTrait>(
    conn: &C,
    conversation_id: &str,
) -> ChatResult<Vec<conversation_participants::Model>> {
    Ok(conversation_participants::Entity::find()
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .order_by_asc(conversation_participants::Column::JoinedAt)
        .all(conn)
        .await?)
}

/// Messages `reader` is allowed to see: not deleted for everyone, not deleted
/// for the reader, and newer than the reader's visibility floor.
pub(crate) fn visible_to(reader: &conversation_participants::Model) -> Condition {
    let hidden_for_reader = Query::select()
        .column(message_deletions::Column::MessageId)
        .from(message_deletions::Entity)
        .and_where(message_deletions::Column::UserId.eq(reader.user_id.clone()))
        .to_owned();

    Condition::all()
        .add(messages::Column::IsDeletedForEveryone.eq(false))
        .add(messages::Column::Id.not_in_subquery(hidden_for_reader))
        .add_option(
            reader
                .cleared_at
                .map(|floor| messages::Column::CreatedAt.gt(floor)),
        )
}

/// Convert message rows to domain messages, attaching their "deleted for"
/// sets with one extra query.
pub(crate) async fn hydrate_messages<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<messages::Model>,
) -> ChatResult<Vec<Message>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|m| m.id.clone()).collect();
    let mut deleted_for: HashMap<String, BTreeSet<String>> = HashMap::new();
    for deletion in message_deletions::Entity::find()
        .filter(message_deletions::Column::MessageId.is_in(ids))
        .all(conn)
        .await?
    {
        deleted_for
            .entry(deletion.message_id)
            .or_default()
            .insert(deletion.user_id);
    }

    rows.into_iter()
        .map(|row| {
            let hidden = deleted_for.remove(&row.id).unwrap_or_default();
            message_from_model(row, hidden)
        })
        .collect()
}

pub(crate) async fn hydrate_message<C: ConnectionTrait>(
    conn: &C,
    row: messages::Model,
) -> ChatResult<Message> {
    hydrate_messages(conn, vec![row])
        .await?
        .pop()
        .ok_or_else(|| ChatError::Internal("message vanished while loading".to_string()))
}

/// Convert Sea-ORM model to Conversation
pub(crate) fn conversation_from_model(model: conversations::Model) -> ChatResult<Conversation> {
    Ok(Conversation {
        id: model.id,
        conversation_type: model.conversation_type.parse()?,
        name: model.name,
        avatar_url: model.avatar_url,
        created_by_id: model.created_by_id,
        last_message_at: model.last_message_at.map(from_millis),
        last_message_preview: model.last_message_preview,
        created_at: from_millis(model.created_at),
        updated_at: from_millis(model.updated_at),
    })
}

/// Convert Sea-ORM model to Participant
pub(crate) fn participant_from_model(
    model: conversation_participants::Model,
) -> ChatResult<Participant> {
    Ok(Participant {
        conversation_id: model.conversation_id,
        user_id: model.user_id,
        role: model.role.parse()?,
        last_read_at: model.last_read_at.map(from_millis),
        first_unread_message_id: model.first_unread_message_id,
        is_muted: model.is_muted,
        cleared_at: model.cleared_at.map(from_millis),
        deleted_at: model.deleted_at.map(from_millis),
        joined_at: from_millis(model.joined_at),
    })
}

/// Convert Sea-ORM model to Message
pub(crate) fn message_from_model(
    model: messages::Model,
    deleted_for_user_ids: BTreeSet<String>,
) -> ChatResult<Message> {
    let metadata: Option<MessageMetadata> = model
        .metadata_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(Message {
        id: model.id,
        conversation_id: model.conversation_id,
        sender_id: model.sender_id,
        kind: model.message_type.parse()?,
        content: model.content,
        metadata,
        status: model.status.parse()?,
        is_edited: model.is_edited,
        deleted_for_user_ids,
        is_deleted_for_everyone: model.is_deleted_for_everyone,
        created_at: from_millis(model.created_at),
        updated_at: from_millis(model.updated_at),
        delivered_at: model.delivered_at.map(from_millis),
        read_at: model.read_at.map(from_millis),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(cleared_at: Option<i64>) -> conversation_participants::Model {
        conversation_participants::Model {
            conversation_id: "c1".into(),
            user_id: "u1".into(),
            role: "member".into(),
            last_read_at: None,
            first_unread_message_id: None,
            is_muted: false,
            cleared_at,
            deleted_at: None,
            joined_at: 0,
        }
    }

    #[test]
    fn test_visibility_predicate_includes_floor_only_when_set() {
        let sql_without = messages::Entity::find()
            .filter(visible_to(&participant(None)))
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(sql_without.contains("is_deleted_for_everyone"));
        assert!(sql_without.contains("message_deletions"));
        assert!(!sql_without.contains("\"created_at\" >"));

        let sql_with = messages::Entity::find()
            .filter(visible_to(&participant(Some(42))))
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(sql_with.contains("\"created_at\" > 42"));
    }

    #[test]
    fn test_message_from_model_parses_metadata() {
        let model = messages::Model {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            message_type: "image".into(),
            content: None,
            metadata_json: Some(r#"{"type":"image","url":"https://x/y.png"}"#.into()),
            status: "sent".into(),
            is_edited: false,
            is_deleted_for_everyone: false,
            created_at: 1,
            updated_at: 1,
            delivered_at: None,
            read_at: None,
        };

        let message = message_from_model(model, BTreeSet::new()).unwrap();
        assert_eq!(
            message.metadata,
            Some(MessageMetadata::Image {
                url: "https://x/y.png".into()
            })
        );
    }
}
