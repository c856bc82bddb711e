//! Database configuration entity model
//!
//! SeaORM entity for the `database_configurations` table. Provider settings
//! are stored sealed; see [`crate::crypto`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "database_configurations")]
pub struct Model {
    /// UUID v4 in text form
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    /// Provider kind slug, also part of the settings AAD
    pub provider: String,

    /// AES-GCM sealed `ProviderSettings` JSON
    pub settings_ciphertext: Vec<u8>,

    /// At most one row is active at any time
    pub is_active: bool,

    /// Outcome of the most recent connection test
    pub is_connected: bool,

    pub last_connection_test: Option<DateTimeWithTimeZone>,

    pub ssl: bool,

    /// Pool size, clamped to 1..=100
    pub max_connections: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
