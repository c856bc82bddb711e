//! Migration to create one table per domain collection.
//!
//! Every collection shares the same shape: an auto-increment identifier, an
//! optional unique key extracted from the record, and the record body as JSON.

use sea_orm_migration::prelude::*;

/// Tables backing the domain collections, in dependency order.
pub const DOMAIN_TABLES: &[&str] = &[
    "users",
    "categories",
    "accounts",
    "products",
    "transactions",
    "budgets",
    "goals",
    "bills",
    "system_config",
    "activity_logs",
];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in DOMAIN_TABLES {
            manager
                .create_table(
                    Table::create()
                        .table(Alias::new(*table))
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Record::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        // MySQL cannot index unbounded text, hence the explicit length.
                        .col(ColumnDef::new(Record::UniqueKey).string_len(191).null())
                        .col(ColumnDef::new(Record::Data).json().not_null())
                        .col(
                            ColumnDef::new(Record::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(
                            ColumnDef::new(Record::UpdatedAt)
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
                        .name(format!("idx_{table}_unique_key"))
                        .table(Alias::new(*table))
                        .col(Record::UniqueKey)
                        .unique()
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in DOMAIN_TABLES.iter().rev() {
            manager
                .drop_table(Table::drop().table(Alias::new(*table)).if_exists().to_owned())
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Record {
    Id,
    UniqueKey,
    Data,
    CreatedAt,
    UpdatedAt,
}
