//! # API Handlers
//!
//! HTTP endpoints: service info, health, the database administration surface
//! and entity CRUD routed through the active adapter.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::providers::ProviderKind;
use crate::server::AppState;

pub mod databases;
pub mod records;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health of the bootstrap store and of the adapter currently serving records
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    /// `None` while records are served from the default storage
    pub active_provider: Option<ProviderKind>,
    pub active_config_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
        (status = 503, description = "Bootstrap store or active provider unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    db::health_check(&state.db).await.map_err(|e| {
        tracing::warn!(error = %e, "Bootstrap store health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "bootstrap store is unreachable",
        )
    })?;

    let adapter = state.active.current();
    adapter.ping().await?;

    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        active_provider: adapter.kind(),
        active_config_id: state.active.config_id(),
    }))
}
