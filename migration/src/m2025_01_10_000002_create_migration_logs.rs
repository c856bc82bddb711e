//! Migration to create the migration_logs table.
//!
//! One row per cross-provider migration attempt, with its status lifecycle
//! and per-collection details.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MigrationLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MigrationLogs::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MigrationLogs::FromProvider).string_len(32).null())
                    .col(ColumnDef::new(MigrationLogs::FromConfigId).string_len(36).null())
                    .col(
                        ColumnDef::new(MigrationLogs::ToProvider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MigrationLogs::ToConfigId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MigrationLogs::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(MigrationLogs::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MigrationLogs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MigrationLogs::RecordsMigrated)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(MigrationLogs::ErrorMessage).text().null())
                    .col(ColumnDef::new(MigrationLogs::MigrationDetails).json().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_migration_logs_status")
                    .table(MigrationLogs::Table)
                    .col(MigrationLogs::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_migration_logs_status")
                    .table(MigrationLogs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(MigrationLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MigrationLogs {
    Table,
    Id,
    FromProvider,
    FromConfigId,
    ToProvider,
    ToConfigId,
    Status,
    StartedAt,
    CompletedAt,
    RecordsMigrated,
    ErrorMessage,
    MigrationDetails,
}
