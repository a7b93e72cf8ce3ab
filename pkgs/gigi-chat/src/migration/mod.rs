//! Sea-ORM migrations for gigi-chat database schema

pub use sea_orm_migration::prelude::*;

mod m20250201_000001_create_conversations_table;
mod m20250201_000002_create_conversation_participants_table;
mod m20250201_000003_create_messages_table;
mod m20250201_000004_create_message_deletions_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250201_000001_create_conversations_table::Migration),
            Box::new(m20250201_000002_create_conversation_participants_table::Migration),
            Box::new(m20250201_000003_create_messages_table::Migration),
            Box::new(m20250201_000004_create_message_deletions_table::Migration),
        ]
    }
}
