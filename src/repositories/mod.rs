//! Repository layer over the bootstrap store.

pub mod database_configuration;
pub mod migration_log;

pub use database_configuration::ConfigurationRepository;
pub use migration_log::{LogUpdate, MigrationLogRepository};
