//! # Database Administration Handlers
//!
//! Configuration CRUD, connection tests, activation, environment templates
//! and cross-provider migrations. Callers are authorized upstream.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::env_template::{self, EnvTemplate};
use crate::error::ApiError;
use crate::models::{
    ConfigurationPatch, ConfigurationView, MigrationRecord, MigrationStatus, NewConfiguration,
};
use crate::server::AppState;
use crate::tester::ConnectionReport;

/// Query parameters of the environment template endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct EnvQuery {
    /// `json` (default) or `dotenv`
    pub format: Option<String>,
    /// Return secrets in clear text (default: false)
    pub reveal: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrateRequest {
    /// Source configuration; absent means the default storage
    #[serde(default)]
    pub from_config_id: Option<String>,
    pub to_config_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationAccepted {
    pub migration_id: String,
    pub status: MigrationStatus,
}

#[utoipa::path(
    get,
    path = "/api/admin/databases",
    responses(
        (status = 200, description = "All configurations, secrets redacted", body = [ConfigurationView])
    ),
    tag = "databases"
)]
pub async fn list_databases(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConfigurationView>>, ApiError> {
    let configs = state.registry.list().await?;
    Ok(Json(configs.iter().map(|c| c.view()).collect()))
}

#[utoipa::path(
    post,
    path = "/api/admin/databases",
    request_body = NewConfiguration,
    responses(
        (status = 201, description = "Configuration created", body = ConfigurationView),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn create_database(
    State(state): State<AppState>,
    payload: Result<Json<NewConfiguration>, JsonRejection>,
) -> Result<(StatusCode, Json<ConfigurationView>), ApiError> {
    let Json(input) = payload?;
    let created = state.registry.create(input).await?;
    Ok((StatusCode::CREATED, Json(created.view())))
}

#[utoipa::path(
    get,
    path = "/api/admin/databases/{id}",
    params(("id" = String, Path, description = "Configuration ID")),
    responses(
        (status = 200, description = "Configuration", body = ConfigurationView),
        (status = 404, description = "Unknown configuration", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn get_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConfigurationView>, ApiError> {
    Ok(Json(state.registry.get(&id).await?.view()))
}

#[utoipa::path(
    put,
    path = "/api/admin/databases/{id}",
    params(("id" = String, Path, description = "Configuration ID")),
    request_body = ConfigurationPatch,
    responses(
        (status = 200, description = "Configuration updated", body = ConfigurationView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Unknown configuration", body = ApiError),
        (status = 409, description = "Credentials of the active configuration cannot change", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn update_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ConfigurationPatch>, JsonRejection>,
) -> Result<Json<ConfigurationView>, ApiError> {
    let Json(patch) = payload?;
    Ok(Json(state.registry.update(&id, patch).await?.view()))
}

#[utoipa::path(
    delete,
    path = "/api/admin/databases/{id}",
    params(("id" = String, Path, description = "Configuration ID")),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "Unknown configuration", body = ApiError),
        (status = 409, description = "Configuration is active", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn delete_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/admin/databases/{id}/test",
    params(("id" = String, Path, description = "Configuration ID")),
    responses(
        (status = 200, description = "Provider reachable", body = ConnectionReport),
        (status = 400, description = "Configuration is invalid", body = ApiError),
        (status = 409, description = "Configuration changed during the test", body = ApiError),
        (status = 503, description = "Provider unreachable", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn test_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionReport>, ApiError> {
    Ok(Json(state.registry.test(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/databases/{id}/activate",
    params(("id" = String, Path, description = "Configuration ID")),
    responses(
        (status = 200, description = "Configuration is now active", body = ConfigurationView),
        (status = 404, description = "Unknown configuration", body = ApiError),
        (status = 409, description = "Configuration has not passed a connection test", body = ApiError),
        (status = 503, description = "Provider unreachable", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn activate_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConfigurationView>, ApiError> {
    Ok(Json(state.registry.activate(&id).await?.view()))
}

#[utoipa::path(
    get,
    path = "/api/admin/databases/{id}/env",
    params(("id" = String, Path, description = "Configuration ID"), EnvQuery),
    responses(
        (status = 200, description = "Environment variables for this configuration", body = std::collections::BTreeMap<String, String>),
        (status = 404, description = "Unknown configuration", body = ApiError)
    ),
    tag = "databases"
)]
pub async fn database_env(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EnvQuery>,
) -> Result<Response, ApiError> {
    let config = state.registry.get(&id).await?;
    let mut vars: EnvTemplate =
        env_template::template(&config.settings, config.ssl, config.max_connections)?;
    if query.reveal != Some(true) {
        vars = env_template::redact(vars);
    } else {
        info!(config_id = %id, "Environment template revealed with secrets");
    }

    match query.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(vars).into_response()),
        "dotenv" => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            env_template::render_dotenv(&vars),
        )
            .into_response()),
        other => Err(ApiError::validation(&format!(
            "format must be json or dotenv, got '{other}'"
        ))),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/databases/active",
    responses(
        (status = 200, description = "Active configuration, or null when the default storage serves records", body = Option<ConfigurationView>)
    ),
    tag = "databases"
)]
pub async fn active_database(
    State(state): State<AppState>,
) -> Result<Json<Option<ConfigurationView>>, ApiError> {
    let active = state.registry.active().await?;
    Ok(Json(active.as_ref().map(|c| c.view())))
}

#[utoipa::path(
    post,
    path = "/api/admin/databases/migrate",
    request_body = MigrateRequest,
    responses(
        (status = 202, description = "Migration started", body = MigrationAccepted),
        (status = 404, description = "Unknown configuration", body = ApiError),
        (status = 409, description = "Target not connected or a migration is already running", body = ApiError)
    ),
    tag = "migrations"
)]
pub async fn start_migration(
    State(state): State<AppState>,
    payload: Result<Json<MigrateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MigrationAccepted>), ApiError> {
    let Json(request) = payload?;
    let prepared = state
        .migrations
        .begin(request.from_config_id.as_deref(), &request.to_config_id)
        .await?;

    let accepted = MigrationAccepted {
        migration_id: prepared.id().to_string(),
        status: prepared.record().status,
    };

    let engine = state.migrations.clone();
    tokio::spawn(async move {
        let id = prepared.id().to_string();
        if let Err(err) = engine.run(prepared).await {
            error!(migration_id = %id, error = %err, "Migration aborted");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

#[utoipa::path(
    get,
    path = "/api/admin/databases/migrations",
    responses(
        (status = 200, description = "Migration history, newest first", body = [MigrationRecord])
    ),
    tag = "migrations"
)]
pub async fn list_migrations(
    State(state): State<AppState>,
) -> Result<Json<Vec<MigrationRecord>>, ApiError> {
    Ok(Json(state.migrations.list().await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/databases/migrations/{id}",
    params(("id" = String, Path, description = "Migration ID")),
    responses(
        (status = 200, description = "Migration record", body = MigrationRecord),
        (status = 404, description = "Unknown migration", body = ApiError)
    ),
    tag = "migrations"
)]
pub async fn get_migration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MigrationRecord>, ApiError> {
    Ok(Json(state.migrations.get(&id).await?))
}
