//! Connection tester
//!
//! Validates a configuration statically, then probes reachability. A bad
//! configuration surfaces as [`StoreError::Validation`] before any I/O; an
//! unreachable one as [`StoreError::Unavailable`].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::StoreError;
use crate::models::DatabaseConfiguration;
use crate::providers::{ProviderKind, ProviderSettings, sql};

/// Outcome of a successful connection test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub provider: ProviderKind,
    pub latency_ms: u64,
    pub tested_at: DateTime<Utc>,
}

/// Lightweight reachability check for one configuration.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn probe(&self, config: &DatabaseConfiguration) -> Result<(), StoreError>;
}

/// Probes real backends: open-then-close for SQL, an authenticated request for the backend service.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl NetworkProbe {
    pub fn new(timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::storage(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl ConnectionProbe for NetworkProbe {
    async fn probe(&self, config: &DatabaseConfiguration) -> Result<(), StoreError> {
        if let ProviderSettings::BackendAsAService {
            service_url,
            service_role_key,
            ..
        } = &config.settings
        {
            let url = format!("{}/rest/v1/", service_url.trim().trim_end_matches('/'));
            let response = self
                .client
                .get(url)
                .header("apikey", service_role_key)
                .bearer_auth(service_role_key)
                .send()
                .await
                .map_err(|e| StoreError::unavailable(e.to_string()))?;

            let status = response.status();
            return if status.is_success() {
                Ok(())
            } else {
                Err(StoreError::unavailable(format!(
                    "service answered HTTP {}",
                    status.as_u16()
                )))
            };
        }

        if let Some(path) = config.settings.file_path() {
            sql::ensure_parent_dir(path).await?;
        }

        let url = config
            .settings
            .connection_url(config.ssl)?
            .ok_or_else(|| StoreError::validation("provider has no connection URL"))?;
        sql::probe(&url, self.timeout).await
    }
}

pub struct ConnectionTester {
    probe: Arc<dyn ConnectionProbe>,
    timeout: Duration,
}

impl ConnectionTester {
    pub fn new(probe: Arc<dyn ConnectionProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Tests `config` without touching the registry.
    pub async fn test(&self, config: &DatabaseConfiguration) -> Result<ConnectionReport, StoreError> {
        let provider = config.provider();
        config.settings.validate()?;

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.probe.probe(config)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err @ StoreError::Validation(_))) => Err(err),
            Ok(Err(StoreError::Unavailable(message))) => Err(StoreError::Unavailable(message)),
            Ok(Err(other)) => Err(StoreError::Unavailable(other.to_string())),
            Err(_) => Err(StoreError::unavailable(format!(
                "probe timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };
        let elapsed = started.elapsed();

        histogram!(
            "connection_test_latency_ms",
            "provider" => provider.as_str(),
            "outcome" => if outcome.is_ok() { "reachable" } else { "unreachable" }
        )
        .record(elapsed.as_secs_f64() * 1_000.0);

        match outcome {
            Ok(()) => {
                let latency_ms = elapsed.as_millis() as u64;
                info!(config_id = %config.id, provider = provider.as_str(), latency_ms, "Connection test passed");
                Ok(ConnectionReport {
                    provider,
                    latency_ms,
                    tested_at: Utc::now(),
                })
            }
            Err(err) => {
                warn!(config_id = %config.id, provider = provider.as_str(), error = %err, "Connection test failed");
                Err(err)
            }
        }
    }
}
