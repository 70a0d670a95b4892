//! Migration: Create users table with a live-only unique username index.

use sea_orm_migration::prelude::*;

/// Partial index: uniqueness only applies to rows that are not soft-deleted.
const CREATE_LIVE_USERNAME_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     idx_users_username_key_live ON users (username_key) WHERE deleted_at IS NULL";

const DROP_LIVE_USERNAME_INDEX: &str = "DROP INDEX IF EXISTS idx_users_username_key_live";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(ColumnDef::new(Users::UsernameKey).string().not_null())
                    .col(ColumnDef::new(Users::Payload).json().not_null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Postgres and SQLite both accept partial indexes; sea-query has no builder for the predicate
        manager
            .get_connection()
            .execute_unprepared(CREATE_LIVE_USERNAME_INDEX)
            .await?;

        // Add index for efficient filtering of live users
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_deleted_at")
                    .table(Users::Table)
                    .col(Users::DeletedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_users_deleted_at")
                    .table(Users::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(DROP_LIVE_USERNAME_INDEX)
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Username,
    UsernameKey,
    Payload,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
