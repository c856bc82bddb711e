//! Database configuration repository
//!
//! Persists [`DatabaseConfiguration`] rows in the bootstrap store, sealing
//! provider settings on write and opening them on read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};

use crate::crypto::{CryptoKey, open_json, seal_json, settings_aad};
use crate::error::StoreError;
use crate::models::configuration::DatabaseConfiguration;
use crate::models::database_configuration::{self, Entity as DatabaseConfigurationEntity};
use crate::providers::ProviderSettings;

/// Repository for database configuration persistence
#[derive(Debug, Clone)]
pub struct ConfigurationRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

fn to_fixed(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.fixed_offset()
}

impl ConfigurationRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    fn decode(&self, model: database_configuration::Model) -> Result<DatabaseConfiguration, StoreError> {
        let aad = settings_aad(&model.id, &model.provider);
        let settings: ProviderSettings = open_json(&self.crypto_key, &aad, &model.settings_ciphertext)
            .map_err(|e| {
                tracing::error!(config_id = %model.id, provider = %model.provider, "Failed to open sealed settings");
                StoreError::storage(format!("settings of configuration {} cannot be read: {e}", model.id))
            })?;

        if settings.kind().as_str() != model.provider {
            return Err(StoreError::storage(format!(
                "configuration {} is stored as {} but its settings describe {}",
                model.id,
                model.provider,
                settings.kind()
            )));
        }

        Ok(DatabaseConfiguration {
            id: model.id,
            name: model.name,
            settings,
            is_active: model.is_active,
            is_connected: model.is_connected,
            last_connection_test: model.last_connection_test.map(|at| at.with_timezone(&Utc)),
            ssl: model.ssl,
            max_connections: u32::try_from(model.max_connections).unwrap_or(1),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }

    fn encode(&self, config: &DatabaseConfiguration) -> Result<database_configuration::ActiveModel, StoreError> {
        let provider = config.provider().as_str();
        let sealed = seal_json(&self.crypto_key, &settings_aad(&config.id, provider), &config.settings)
            .map_err(|e| StoreError::storage(format!("failed to seal settings: {e}")))?;

        Ok(database_configuration::ActiveModel {
            id: Set(config.id.clone()),
            name: Set(config.name.clone()),
            provider: Set(provider.to_string()),
            settings_ciphertext: Set(sealed),
            is_active: Set(config.is_active),
            is_connected: Set(config.is_connected),
            last_connection_test: Set(config.last_connection_test.map(to_fixed)),
            ssl: Set(config.ssl),
            max_connections: Set(config.max_connections as i32),
            created_at: Set(to_fixed(config.created_at)),
            updated_at: Set(to_fixed(config.updated_at)),
        })
    }

    /// Lists all configurations ordered by creation time then ID
    pub async fn list(&self) -> Result<Vec<DatabaseConfiguration>, StoreError> {
        DatabaseConfigurationEntity::find()
            .order_by_asc(database_configuration::Column::CreatedAt)
            .order_by_asc(database_configuration::Column::Id)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|model| self.decode(model))
            .collect()
    }

    pub async fn find(&self, id: &str) -> Result<Option<DatabaseConfiguration>, StoreError> {
        DatabaseConfigurationEntity::find_by_id(id.to_string())
            .one(&*self.db)
            .await?
            .map(|model| self.decode(model))
            .transpose()
    }

    pub async fn get(&self, id: &str) -> Result<DatabaseConfiguration, StoreError> {
        self.find(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("configuration {id}")))
    }

    pub async fn find_active(&self) -> Result<Option<DatabaseConfiguration>, StoreError> {
        DatabaseConfigurationEntity::find()
            .filter(database_configuration::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .map(|model| self.decode(model))
            .transpose()
    }

    pub async fn insert(&self, config: &DatabaseConfiguration) -> Result<DatabaseConfiguration, StoreError> {
        self.encode(config)?.insert(&*self.db).await?;
        self.get(&config.id).await
    }

    /// Writes every column of `config`, resealing its settings.
    pub async fn save(&self, config: &DatabaseConfiguration) -> Result<DatabaseConfiguration, StoreError> {
        if DatabaseConfigurationEntity::find_by_id(config.id.clone())
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound(format!("configuration {}", config.id)));
        }

        self.encode(config)?.update(&*self.db).await?;
        self.get(&config.id).await
    }

    /// Records the outcome of a connection test.
    pub async fn record_test(
        &self,
        id: &str,
        connected: bool,
        tested_at: DateTime<Utc>,
    ) -> Result<DatabaseConfiguration, StoreError> {
        let result = DatabaseConfigurationEntity::update_many()
            .col_expr(database_configuration::Column::IsConnected, Expr::value(connected))
            .col_expr(
                database_configuration::Column::LastConnectionTest,
                Expr::value(to_fixed(tested_at)),
            )
            .col_expr(database_configuration::Column::UpdatedAt, Expr::value(to_fixed(tested_at)))
            .filter(database_configuration::Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("configuration {id}")));
        }
        self.get(id).await
    }

    /// Deletes an inactive configuration.
    pub async fn delete_inactive(&self, id: &str) -> Result<(), StoreError> {
        let result = DatabaseConfigurationEntity::delete_many()
            .filter(database_configuration::Column::Id.eq(id))
            .filter(database_configuration::Column::IsActive.eq(false))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 1 {
            return Ok(());
        }

        match self.find(id).await? {
            Some(_) => Err(StoreError::ConfigurationActive(id.to_string())),
            None => Err(StoreError::NotFound(format!("configuration {id}"))),
        }
    }

    /// Makes `id` the only active configuration in one transaction.
    pub async fn set_active_exclusive(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<DatabaseConfiguration, StoreError> {
        let txn = self.db.begin().await?;

        DatabaseConfigurationEntity::update_many()
            .col_expr(database_configuration::Column::IsActive, Expr::value(false))
            .col_expr(database_configuration::Column::UpdatedAt, Expr::value(to_fixed(at)))
            .filter(database_configuration::Column::IsActive.eq(true))
            .filter(database_configuration::Column::Id.ne(id))
            .exec(&txn)
            .await?;

        let activated = DatabaseConfigurationEntity::update_many()
            .col_expr(database_configuration::Column::IsActive, Expr::value(true))
            .col_expr(database_configuration::Column::UpdatedAt, Expr::value(to_fixed(at)))
            .filter(database_configuration::Column::Id.eq(id))
            .filter(database_configuration::Column::IsConnected.eq(true))
            .exec(&txn)
            .await?;

        if activated.rows_affected != 1 {
            txn.rollback().await?;
            return match self.find(id).await? {
                Some(_) => Err(StoreError::NotConnected(id.to_string())),
                None => Err(StoreError::NotFound(format!("configuration {id}"))),
            };
        }

        txn.commit().await?;
        self.get(id).await
    }
}
