//! Domain view of a database configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::providers::{ProviderKind, ProviderSettings};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const MAX_CONNECTIONS_LIMIT: u32 = 100;
pub const NAME_MAX_CHARS: usize = 100;

/// Clamps a requested pool size into `1..=100`, defaulting to 10.
pub fn clamp_max_connections(requested: Option<i64>) -> u32 {
    match requested {
        None => DEFAULT_MAX_CONNECTIONS,
        Some(value) => value.clamp(1, MAX_CONNECTIONS_LIMIT as i64) as u32,
    }
}

/// A named, provider-typed connection descriptor with decrypted settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfiguration {
    pub id: String,
    pub name: String,
    pub settings: ProviderSettings,
    pub is_active: bool,
    pub is_connected: bool,
    pub last_connection_test: Option<DateTime<Utc>>,
    pub ssl: bool,
    pub max_connections: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatabaseConfiguration {
    pub fn provider(&self) -> ProviderKind {
        self.settings.kind()
    }

    /// API representation with every secret masked.
    pub fn view(&self) -> ConfigurationView {
        ConfigurationView {
            id: self.id.clone(),
            name: self.name.clone(),
            provider: self.provider(),
            settings: self.settings.redacted(),
            is_active: self.is_active,
            is_connected: self.is_connected,
            last_connection_test: self.last_connection_test,
            ssl: self.ssl,
            max_connections: self.max_connections,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Redacted configuration as returned by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationView {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub settings: ProviderSettings,
    pub is_active: bool,
    pub is_connected: bool,
    pub last_connection_test: Option<DateTime<Utc>>,
    pub ssl: bool,
    pub max_connections: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator input for creating a configuration.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewConfiguration {
    pub name: String,
    pub settings: ProviderSettings,
    #[serde(default)]
    pub ssl: Option<bool>,
    #[serde(default)]
    pub max_connections: Option<i64>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: Option<ProviderSettings>,
    #[serde(default)]
    pub ssl: Option<bool>,
    #[serde(default)]
    pub max_connections: Option<i64>,
}
