//! Message entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub message_type: String, // "text", "image" or "project_share"
    pub content: Option<String>,
    pub metadata_json: Option<String>,
    pub status: String, // "sent", "delivered" or "read"
    pub is_edited: bool,
    pub is_deleted_for_everyone: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub delivered_at: Option<i64>,
    pub read_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversations::Entity",
        from = "Column::ConversationId",
        to = "super::conversations::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Conversation,
    #[sea_orm(has_many = "super::message_deletions::Entity")]
    MessageDeletions,
}

impl Related<super::conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl Related<super::message_deletions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MessageDeletions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
