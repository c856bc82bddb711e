//! Configuration registry
//!
//! CRUD over database configurations plus single-active activation. The
//! active adapter is opened before the activation section is entered; inside
//! it one bootstrap transaction flips the flags and the shared handle is swapped.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::configuration::{
    ConfigurationPatch, DatabaseConfiguration, NAME_MAX_CHARS, NewConfiguration,
    clamp_max_connections,
};
use crate::providers::{ActiveAdapter, AdapterFactory, ProviderSettings};
use crate::repositories::ConfigurationRepository;
use crate::tester::{ConnectionReport, ConnectionTester};

pub struct ConfigurationRegistry {
    repo: ConfigurationRepository,
    tester: Arc<ConnectionTester>,
    factory: Arc<dyn AdapterFactory>,
    active: ActiveAdapter,
    activation: Mutex<()>,
}

fn validate_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation("name is required"));
    }
    if trimmed.chars().count() > NAME_MAX_CHARS {
        return Err(StoreError::validation(format!(
            "name must be at most {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// True when `settings` with `ssl` would open a different connection than `config` does.
fn connection_changed(config: &DatabaseConfiguration, settings: &ProviderSettings, ssl: bool) -> bool {
    if config.settings.credentials_differ(settings) {
        return true;
    }
    ssl != config.ssl && settings.connection_url(ssl).ok() != settings.connection_url(config.ssl).ok()
}

impl ConfigurationRegistry {
    pub fn new(
        repo: ConfigurationRepository,
        tester: Arc<ConnectionTester>,
        factory: Arc<dyn AdapterFactory>,
        active: ActiveAdapter,
    ) -> Self {
        Self {
            repo,
            tester,
            factory,
            active,
            activation: Mutex::new(()),
        }
    }

    pub fn active_adapter(&self) -> &ActiveAdapter {
        &self.active
    }

    pub async fn list(&self) -> Result<Vec<DatabaseConfiguration>, StoreError> {
        self.repo.list().await
    }

    pub async fn get(&self, id: &str) -> Result<DatabaseConfiguration, StoreError> {
        self.repo.get(id).await
    }

    /// The persisted active configuration, if any.
    pub async fn active(&self) -> Result<Option<DatabaseConfiguration>, StoreError> {
        self.repo.find_active().await
    }

    pub async fn create(&self, input: NewConfiguration) -> Result<DatabaseConfiguration, StoreError> {
        let name = validate_name(&input.name)?;
        input.settings.validate()?;

        let now = Utc::now();
        let config = DatabaseConfiguration {
            id: Uuid::new_v4().to_string(),
            name,
            settings: input.settings,
            is_active: false,
            is_connected: false,
            last_connection_test: None,
            ssl: input.ssl.unwrap_or(true),
            max_connections: clamp_max_connections(input.max_connections),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.insert(&config).await?;
        info!(config_id = %created.id, provider = created.provider().as_str(), "Created database configuration");
        Ok(created)
    }

    /// Applies `patch`. Changes that alter the connection reset its tested state and are
    /// refused on the active configuration. `max_connections` takes effect on the next activation.
    pub async fn update(
        &self,
        id: &str,
        patch: ConfigurationPatch,
    ) -> Result<DatabaseConfiguration, StoreError> {
        let _section = self.activation.lock().await;
        let mut config = self.repo.get(id).await?;

        if let Some(name) = patch.name {
            config.name = validate_name(&name)?;
        }

        let settings = match patch.settings {
            Some(settings) => {
                settings.validate()?;
                settings
            }
            None => config.settings.clone(),
        };
        let ssl = patch.ssl.unwrap_or(config.ssl);

        if connection_changed(&config, &settings, ssl) {
            if config.is_active {
                return Err(StoreError::ConfigurationActive(id.to_string()));
            }
            config.is_connected = false;
            config.last_connection_test = None;
        }
        config.settings = settings;
        config.ssl = ssl;

        if patch.max_connections.is_some() {
            config.max_connections = clamp_max_connections(patch.max_connections);
        }
        config.updated_at = Utc::now();

        let saved = self.repo.save(&config).await?;
        info!(config_id = %saved.id, is_connected = saved.is_connected, "Updated database configuration");
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _section = self.activation.lock().await;
        self.repo.delete_inactive(id).await?;
        info!(config_id = %id, "Deleted database configuration");
        Ok(())
    }

    /// Runs the connection tester and records the outcome on the configuration.
    ///
    /// The outcome is only recorded if the connection inputs are unchanged since the
    /// probe started; otherwise the stale result is discarded with `Conflict`.
    pub async fn test(&self, id: &str) -> Result<ConnectionReport, StoreError> {
        let config = self.repo.get(id).await?;
        let outcome = self.tester.test(&config).await;

        let (connected, tested_at) = match &outcome {
            Ok(report) => (true, report.tested_at),
            Err(StoreError::Unavailable(_) | StoreError::Validation(_)) => (false, Utc::now()),
            Err(_) => return outcome,
        };

        let _section = self.activation.lock().await;
        let current = self.repo.get(id).await?;
        if connection_changed(&config, &current.settings, current.ssl) {
            warn!(config_id = %id, "Configuration changed during connection test; result discarded");
            return Err(StoreError::Conflict(format!(
                "configuration {id} changed while it was being tested"
            )));
        }
        self.repo.record_test(id, connected, tested_at).await?;
        outcome
    }

    /// Makes `id` the single active configuration and routes entity CRUD to it.
    pub async fn activate(&self, id: &str) -> Result<DatabaseConfiguration, StoreError> {
        let config = self.repo.get(id).await?;
        if !config.is_connected {
            return Err(StoreError::NotConnected(id.to_string()));
        }

        let adapter = self.factory.open(&config).await?;

        let _section = self.activation.lock().await;
        let current = self.repo.get(id).await?;
        if !current.is_connected || connection_changed(&config, &current.settings, current.ssl) {
            return Err(StoreError::NotConnected(id.to_string()));
        }
        let activated = self.repo.set_active_exclusive(id, Utc::now()).await?;
        let previous = self.active.swap(id.to_string(), adapter);

        counter!("configuration_activations_total", "provider" => activated.provider().as_str())
            .increment(1);
        info!(
            config_id = %id,
            provider = activated.provider().as_str(),
            previous = previous.as_deref().unwrap_or("default"),
            "Activated database configuration"
        );
        Ok(activated)
    }

    /// Points the shared handle at the persisted active configuration, if it can be opened.
    pub async fn restore_active(&self) -> Result<Option<String>, StoreError> {
        let Some(config) = self.repo.find_active().await? else {
            return Ok(None);
        };

        match self.factory.open(&config).await {
            Ok(adapter) => {
                let _section = self.activation.lock().await;
                self.active.swap(config.id.clone(), adapter);
                info!(config_id = %config.id, provider = config.provider().as_str(), "Restored active configuration");
                Ok(Some(config.id))
            }
            Err(err) => {
                warn!(
                    config_id = %config.id,
                    provider = config.provider().as_str(),
                    error = %err,
                    "Active configuration could not be opened; serving from default storage"
                );
                Ok(None)
            }
        }
    }
}
