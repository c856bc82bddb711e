//! Migration to create the database_configurations table.
//!
//! Each row is a named, provider-typed connection descriptor. Credentials are
//! stored sealed in `settings_ciphertext`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DatabaseConfigurations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatabaseConfigurations::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::Name)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::Provider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::SettingsCiphertext)
                            .blob()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::IsConnected)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::LastConnectionTest)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::Ssl)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::MaxConnections)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DatabaseConfigurations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_database_configurations_is_active")
                    .table(DatabaseConfigurations::Table)
                    .col(DatabaseConfigurations::IsActive)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_database_configurations_is_active")
                    .table(DatabaseConfigurations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DatabaseConfigurations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DatabaseConfigurations {
    Table,
    Id,
    Name,
    Provider,
    SettingsCiphertext,
    IsActive,
    IsConnected,
    LastConnectionTest,
    Ssl,
    MaxConnections,
    CreatedAt,
    UpdatedAt,
}
