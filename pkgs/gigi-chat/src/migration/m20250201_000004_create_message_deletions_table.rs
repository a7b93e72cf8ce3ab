use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum MessageDeletions {
    Table,
    MessageId,
    UserId,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250201_000004_create_message_deletions_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MessageDeletions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessageDeletions::MessageId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MessageDeletions::UserId).string().not_null())
                    .col(
                        ColumnDef::new(MessageDeletions::DeletedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(MessageDeletions::MessageId)
                            .col(MessageDeletions::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_message_deletions_message")
                            .from(MessageDeletions::Table, MessageDeletions::MessageId)
                            .to(Messages::Table, Messages::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_deletions_user")
                    .table(MessageDeletions::Table)
                    .col(MessageDeletions::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MessageDeletions::Table).to_owned())
            .await
    }
}
