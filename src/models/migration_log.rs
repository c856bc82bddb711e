//! Migration log entity model
//!
//! SeaORM entity for the `migration_logs` table, one row per migration attempt.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "migration_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Source provider slug, `None` for the in-process default storage
    pub from_provider: Option<String>,

    pub from_config_id: Option<String>,

    pub to_provider: String,

    pub to_config_id: String,

    /// pending | in_progress | completed | failed
    pub status: String,

    pub started_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,

    pub records_migrated: i64,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// Per-collection counts and record failures
    #[sea_orm(column_type = "Json", nullable)]
    pub migration_details: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
