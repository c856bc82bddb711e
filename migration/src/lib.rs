//! Database migrations for the Fintrack storage service.
//!
//! [`Migrator`] prepares the bootstrap store (configurations and migration
//! logs). [`DomainMigrator`] prepares the domain collections of every
//! SQL-backed provider and tracks itself in a separate table, so both can
//! share one database.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_database_configurations;
mod m2025_01_10_000002_create_migration_logs;
mod m2025_01_10_000003_create_domain_collections;

pub use m2025_01_10_000003_create_domain_collections::DOMAIN_TABLES;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_database_configurations::Migration),
            Box::new(m2025_01_10_000002_create_migration_logs::Migration),
        ]
    }
}

pub struct DomainMigrator;

#[async_trait::async_trait]
impl MigratorTrait for DomainMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m2025_01_10_000003_create_domain_collections::Migration,
        )]
    }

    fn migration_table_name() -> DynIden {
        Alias::new("fintrack_domain_migrations").into_iden()
    }
}
