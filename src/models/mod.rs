//! # Data Models
//!
//! SeaORM entities for the bootstrap store plus the domain types built from them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod configuration;
pub mod database_configuration;
pub mod migration;
pub mod migration_log;

pub use configuration::{
    ConfigurationPatch, ConfigurationView, DatabaseConfiguration, NewConfiguration,
};
pub use database_configuration::Entity as DatabaseConfigurationEntity;
pub use migration::{MigrationDetails, MigrationRecord, MigrationStatus};
pub use migration_log::Entity as MigrationLog;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "fintrack-storage".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
