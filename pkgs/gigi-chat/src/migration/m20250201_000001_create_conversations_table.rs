use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    ConversationType,
    Name,
    AvatarUrl,
    CreatedById,
    DirectKey,
    LastMessageAt,
    LastMessagePreview,
    CreatedAt,
    UpdatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000001_create_conversations_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ConversationType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversations::Name).string())
                    .col(ColumnDef::new(Conversations::AvatarUrl).string())
                    .col(
                        ColumnDef::new(Conversations::CreatedById)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversations::DirectKey).string().unique_key())
                    .col(ColumnDef::new(Conversations::LastMessageAt).big_integer())
                    .col(ColumnDef::new(Conversations::LastMessagePreview).string())
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_last_message_at")
                    .table(Conversations::Table)
                    .col(Conversations::LastMessageAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversations::Table).to_owned())
            .await
    }
}
