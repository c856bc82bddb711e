//! Turning configurations into adapters, and the shared handle of the active one.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;

use super::adapter::{ProviderAdapter, TimeoutAdapter};
use super::rest::RestAdapter;
use super::sql::{PoolSettings, SqlAdapter, ensure_parent_dir};
use super::ProviderSettings;
use crate::config::ProviderRuntimeConfig;
use crate::error::StoreError;
use crate::models::DatabaseConfiguration;

/// Builds a ready-to-use adapter for a configuration.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn open(
        &self,
        config: &DatabaseConfiguration,
    ) -> Result<Arc<dyn ProviderAdapter>, StoreError>;
}

/// Production factory: SQL providers through sea-orm, the backend service over HTTP.
#[derive(Debug, Clone)]
pub struct DefaultAdapterFactory {
    op_timeout: Duration,
    connect_timeout: Duration,
}

impl DefaultAdapterFactory {
    pub fn new(op_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            op_timeout,
            connect_timeout,
        }
    }

    pub fn from_config(config: &ProviderRuntimeConfig) -> Self {
        Self::new(config.op_timeout(), config.probe_timeout())
    }

    async fn open_inner(
        &self,
        config: &DatabaseConfiguration,
    ) -> Result<Arc<dyn ProviderAdapter>, StoreError> {
        let kind = config.provider();

        if let ProviderSettings::BackendAsAService {
            service_url,
            service_role_key,
            ..
        } = &config.settings
        {
            let adapter = RestAdapter::new(service_url, service_role_key, self.connect_timeout)?;
            return Ok(Arc::new(adapter));
        }

        if let Some(path) = config.settings.file_path() {
            ensure_parent_dir(path).await?;
        }

        let url = config
            .settings
            .connection_url(config.ssl)?
            .ok_or_else(|| StoreError::validation(format!("{kind} has no connection URL")))?;
        let pool = PoolSettings {
            max_connections: config.max_connections,
            connect_timeout: self.connect_timeout,
        };

        Ok(Arc::new(SqlAdapter::connect(kind, &url, pool).await?))
    }
}

#[async_trait]
impl AdapterFactory for DefaultAdapterFactory {
    async fn open(
        &self,
        config: &DatabaseConfiguration,
    ) -> Result<Arc<dyn ProviderAdapter>, StoreError> {
        config.settings.validate()?;

        let adapter = tokio::time::timeout(self.op_timeout, self.open_inner(config))
            .await
            .map_err(|_| {
                StoreError::unavailable(format!(
                    "opening {} timed out after {}ms",
                    config.provider(),
                    self.op_timeout.as_millis()
                ))
            })??;

        tracing::info!(
            config_id = %config.id,
            provider = config.provider().as_str(),
            "Opened provider adapter"
        );
        Ok(Arc::new(TimeoutAdapter::new(adapter, self.op_timeout)))
    }
}

struct ActiveSlot {
    config_id: Option<String>,
    adapter: Arc<dyn ProviderAdapter>,
}

/// Shared handle to the adapter serving entity CRUD.
///
/// Starts on the in-process default storage; the registry swaps it on activation.
#[derive(Clone)]
pub struct ActiveAdapter {
    default_storage: Arc<dyn ProviderAdapter>,
    slot: Arc<RwLock<ActiveSlot>>,
}

impl ActiveAdapter {
    pub fn new(default_storage: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(ActiveSlot {
                config_id: None,
                adapter: default_storage.clone(),
            })),
            default_storage,
        }
    }

    /// The adapter currently serving requests.
    pub fn current(&self) -> Arc<dyn ProviderAdapter> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .adapter
            .clone()
    }

    /// ID of the active configuration, `None` while on the default storage.
    pub fn config_id(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config_id
            .clone()
    }

    pub fn default_storage(&self) -> Arc<dyn ProviderAdapter> {
        self.default_storage.clone()
    }

    /// Replaces the active adapter, returning the previous configuration ID.
    pub fn swap(&self, config_id: String, adapter: Arc<dyn ProviderAdapter>) -> Option<String> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let previous = slot.config_id.replace(config_id);
        slot.adapter = adapter;
        previous
    }
}
