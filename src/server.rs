//! # Server Configuration
//!
//! Application state wiring and the Axum router for the storage service.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers::{self, databases, records};
use crate::migration_engine::MigrationEngine;
use crate::providers::{
    ActiveAdapter, AdapterFactory, DefaultAdapterFactory, MemoryAdapter, ProviderAdapter,
};
use crate::registry::ConfigurationRegistry;
use crate::repositories::{ConfigurationRepository, MigrationLogRepository};
use crate::telemetry;
use crate::tester::{ConnectionProbe, ConnectionTester, NetworkProbe};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub registry: Arc<ConfigurationRegistry>,
    pub migrations: Arc<MigrationEngine>,
    pub active: ActiveAdapter,
}

impl AppState {
    /// Wires the registry and migration engine around explicit collaborators.
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        probe: Arc<dyn ConnectionProbe>,
        factory: Arc<dyn AdapterFactory>,
        default_storage: Arc<dyn ProviderAdapter>,
    ) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .context("FINTRACK_CRYPTO_KEY is required to seal provider settings")?;
        let crypto_key = CryptoKey::new(key_bytes).context("Invalid crypto key")?;

        let db = Arc::new(db);
        let configs = ConfigurationRepository::new(db.clone(), crypto_key);
        let logs = MigrationLogRepository::new(db.clone());
        let active = ActiveAdapter::new(default_storage.clone());
        let tester = Arc::new(ConnectionTester::new(
            probe,
            config.providers.probe_timeout(),
        ));

        let registry = ConfigurationRegistry::new(
            configs.clone(),
            tester,
            factory.clone(),
            active.clone(),
        );
        let migrations = MigrationEngine::new(
            logs,
            configs,
            factory,
            default_storage,
            config.migration.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            registry: Arc::new(registry),
            migrations: Arc::new(migrations),
            active,
        })
    }

    /// Production wiring: network probes, real adapters, in-process default storage.
    pub fn production(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Self> {
        let probe = NetworkProbe::new(config.providers.probe_timeout())
            .context("Failed to build connection probe")?;
        let factory = DefaultAdapterFactory::from_config(&config.providers);
        Self::new(
            config,
            db,
            Arc::new(probe),
            Arc::new(factory),
            Arc::new(MemoryAdapter::new()),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/",
            get(databases::list_databases).post(databases::create_database),
        )
        .route("/active", get(databases::active_database))
        .route("/migrate", post(databases::start_migration))
        .route("/migrations", get(databases::list_migrations))
        .route("/migrations/{id}", get(databases::get_migration))
        .route(
            "/{id}",
            get(databases::get_database)
                .put(databases::update_database)
                .delete(databases::delete_database),
        )
        .route("/{id}/test", post(databases::test_database))
        .route("/{id}/activate", post(databases::activate_database))
        .route("/{id}/env", get(databases::database_env));

    let records = Router::new()
        .route(
            "/{collection}",
            get(records::list_records).post(records::create_record),
        )
        .route(
            "/{collection}/{id}",
            get(records::get_record)
                .patch(records::update_record)
                .delete(records::delete_record),
        );

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .nest("/api/admin/databases", admin)
        .nest("/api/records", records)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server with the given state
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .context("Invalid server address")?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::databases::list_databases,
        crate::handlers::databases::create_database,
        crate::handlers::databases::get_database,
        crate::handlers::databases::update_database,
        crate::handlers::databases::delete_database,
        crate::handlers::databases::test_database,
        crate::handlers::databases::activate_database,
        crate::handlers::databases::database_env,
        crate::handlers::databases::active_database,
        crate::handlers::databases::start_migration,
        crate::handlers::databases::list_migrations,
        crate::handlers::databases::get_migration,
        crate::handlers::records::list_records,
        crate::handlers::records::create_record,
        crate::handlers::records::get_record,
        crate::handlers::records::update_record,
        crate::handlers::records::delete_record,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthStatus,
            crate::models::ConfigurationView,
            crate::models::NewConfiguration,
            crate::models::ConfigurationPatch,
            crate::models::MigrationRecord,
            crate::models::MigrationStatus,
            crate::providers::ProviderKind,
            crate::providers::ProviderSettings,
            crate::providers::ServerCredentials,
            crate::providers::Collection,
            crate::tester::ConnectionReport,
            crate::handlers::databases::MigrateRequest,
            crate::handlers::databases::MigrationAccepted,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "databases", description = "Database configuration administration"),
        (name = "migrations", description = "Cross-provider data migrations"),
        (name = "records", description = "Domain records served by the active provider"),
    ),
    info(
        title = "Fintrack Storage API",
        description = "Provider administration and cross-database migration for Fintrack",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
