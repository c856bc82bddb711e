//! Migration log repository
//!
//! Persists [`MigrationRecord`] rows and enforces the forward-only status
//! lifecycle and the monotonic `records_migrated` counter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use crate::error::StoreError;
use crate::models::migration::{MigrationRecord, MigrationStatus};
use crate::models::migration_log::{self, Entity as MigrationLog};

#[derive(Debug, Clone)]
pub struct MigrationLogRepository {
    db: Arc<DatabaseConnection>,
}

fn decode(model: migration_log::Model) -> Result<MigrationRecord, StoreError> {
    Ok(MigrationRecord {
        from_provider: model
            .from_provider
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|_| StoreError::storage(format!("migration {} has an unknown source provider", model.id)))?,
        to_provider: model
            .to_provider
            .parse()
            .map_err(|_| StoreError::storage(format!("migration {} has an unknown target provider", model.id)))?,
        status: model.status.parse()?,
        id: model.id,
        from_config_id: model.from_config_id,
        to_config_id: model.to_config_id,
        started_at: model.started_at.with_timezone(&Utc),
        completed_at: model.completed_at.map(|at| at.with_timezone(&Utc)),
        records_migrated: u64::try_from(model.records_migrated).unwrap_or_default(),
        error_message: model.error_message,
        migration_details: model.migration_details.unwrap_or_default(),
    })
}

/// Changes applied together with a status transition or progress flush.
#[derive(Debug, Clone, Default)]
pub struct LogUpdate {
    pub status: Option<MigrationStatus>,
    pub records_migrated: Option<u64>,
    pub migration_details: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl MigrationLogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(&self, record: &MigrationRecord) -> Result<MigrationRecord, StoreError> {
        migration_log::ActiveModel {
            id: Set(record.id.clone()),
            from_provider: Set(record.from_provider.map(|p| p.as_str().to_string())),
            from_config_id: Set(record.from_config_id.clone()),
            to_provider: Set(record.to_provider.as_str().to_string()),
            to_config_id: Set(record.to_config_id.clone()),
            status: Set(record.status.as_str().to_string()),
            started_at: Set(record.started_at.fixed_offset()),
            completed_at: Set(record.completed_at.map(|at| at.fixed_offset())),
            records_migrated: Set(record.records_migrated as i64),
            error_message: Set(record.error_message.clone()),
            migration_details: Set(Some(record.migration_details.clone())),
        }
        .insert(&*self.db)
        .await?;

        self.get(&record.id).await
    }

    pub async fn get(&self, id: &str) -> Result<MigrationRecord, StoreError> {
        MigrationLog::find_by_id(id.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("migration {id}")))
            .and_then(decode)
    }

    /// Most recent first.
    pub async fn list(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        MigrationLog::find()
            .order_by_desc(migration_log::Column::StartedAt)
            .order_by_asc(migration_log::Column::Id)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find_in_progress(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        MigrationLog::find()
            .filter(migration_log::Column::Status.eq(MigrationStatus::InProgress.as_str()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Applies `update`, refusing backward transitions and shrinking counters.
    pub async fn apply(
        &self,
        id: &str,
        update: LogUpdate,
        at: DateTime<Utc>,
    ) -> Result<MigrationRecord, StoreError> {
        let txn = self.db.begin().await?;
        let current = MigrationLog::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("migration {id}")))?;
        let current_status: MigrationStatus = current.status.parse()?;
        let current_count = current.records_migrated;

        let mut model = current.into_active_model();

        if let Some(next) = update.status {
            if !current_status.can_transition_to(next) {
                return Err(StoreError::Conflict(format!(
                    "migration {id} cannot move from {current_status} to {next}"
                )));
            }
            model.status = Set(next.as_str().to_string());
            if next.is_terminal() {
                model.completed_at = Set(Some(at.fixed_offset()));
            }
        } else if current_status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "migration {id} is already {current_status}"
            )));
        }

        if let Some(count) = update.records_migrated {
            let count = count as i64;
            if count < current_count {
                return Err(StoreError::Conflict(format!(
                    "migration {id} records_migrated cannot decrease ({current_count} -> {count})"
                )));
            }
            model.records_migrated = Set(count);
        }
        if let Some(details) = update.migration_details {
            model.migration_details = Set(Some(details));
        }
        if let Some(message) = update.error_message {
            model.error_message = Set(Some(message));
        }

        let updated = model.update(&txn).await?;
        txn.commit().await?;
        decode(updated)
    }
}
