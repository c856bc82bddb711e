//! Test utilities shared by the integration suites.
//!
//! In-memory SQLite bootstrap stores, controllable connection probes and an
//! adapter factory backed by per-configuration in-memory stores.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use async_trait::async_trait;
use fintrack::{
    config::{AppConfig, MigrationConfig},
    error::StoreError,
    models::{DatabaseConfiguration, NewConfiguration},
    providers::{
        AdapterFactory, Collection, Fields, MemoryAdapter, ProviderAdapter, ProviderKind,
        ProviderSettings, Record, RecordFilter, RecordId,
    },
    server::AppState,
    tester::ConnectionProbe,
};
use sea_orm::DatabaseConnection;
use serde_json::Value;

pub const TEST_CRYPTO_KEY: [u8; 32] = [7u8; 32];

/// Bootstrap configuration pointing at a private in-memory SQLite database.
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        db_max_connections: 1,
        crypto_key: Some(TEST_CRYPTO_KEY.to_vec()),
        migration: MigrationConfig {
            concurrency: 4,
            failure_sample: 3,
        },
        ..Default::default()
    }
}

/// Sets up an in-memory SQLite bootstrap store with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = fintrack::db::init_pool(&test_config()).await?;
    fintrack::db::run_migrations(&db).await?;
    Ok(db)
}

/// Probe returning a fixed outcome and counting its calls.
pub struct CountingProbe {
    calls: AtomicUsize,
    outcome: Mutex<Result<(), StoreError>>,
}

impl CountingProbe {
    pub fn reachable() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Mutex::new(Ok(())),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Mutex::new(Err(StoreError::unavailable("connection refused"))),
        })
    }

    pub fn set_outcome(&self, outcome: Result<(), StoreError>) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProbe for CountingProbe {
    async fn probe(&self, _config: &DatabaseConfiguration) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.lock().unwrap().clone()
    }
}

/// Factory handing out one in-memory store per configuration ID.
#[derive(Default)]
pub struct MemoryFactory {
    stores: Mutex<HashMap<String, Arc<MemoryAdapter>>>,
    failing: Mutex<HashSet<String>>,
    opens: AtomicUsize,
}

impl MemoryFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The store backing `config_id`, created on first use.
    pub fn store(&self, config_id: &str) -> Arc<MemoryAdapter> {
        self.stores
            .lock()
            .unwrap()
            .entry(config_id.to_string())
            .or_default()
            .clone()
    }

    /// Makes every later `open` of `config_id` fail as unreachable.
    pub fn fail_on(&self, config_id: &str) {
        self.failing.lock().unwrap().insert(config_id.to_string());
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdapterFactory for MemoryFactory {
    async fn open(
        &self,
        config: &DatabaseConfiguration,
    ) -> Result<Arc<dyn ProviderAdapter>, StoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&config.id) {
            return Err(StoreError::unavailable(format!("{} is down", config.id)));
        }
        let adapter: Arc<dyn ProviderAdapter> = self.store(&config.id);
        Ok(adapter)
    }
}

/// Adapter whose every operation fails as unreachable.
pub struct BrokenAdapter;

#[async_trait]
impl ProviderAdapter for BrokenAdapter {
    fn kind(&self) -> Option<ProviderKind> {
        None
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::unavailable("broken"))
    }

    async fn list(&self, _: Collection, _: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        Err(StoreError::unavailable("broken"))
    }

    async fn get(&self, _: Collection, _: &RecordId) -> Result<Record, StoreError> {
        Err(StoreError::unavailable("broken"))
    }

    async fn insert(&self, _: Collection, _: Fields) -> Result<Record, StoreError> {
        Err(StoreError::unavailable("broken"))
    }

    async fn update(&self, _: Collection, _: &RecordId, _: Fields) -> Result<Record, StoreError> {
        Err(StoreError::unavailable("broken"))
    }

    async fn delete(&self, _: Collection, _: &RecordId) -> Result<(), StoreError> {
        Err(StoreError::unavailable("broken"))
    }
}

/// Everything a test needs to drive the registry and the migration engine.
pub struct Harness {
    pub state: AppState,
    pub probe: Arc<CountingProbe>,
    pub factory: Arc<MemoryFactory>,
    pub default_storage: Arc<dyn ProviderAdapter>,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        Self::with_default_storage(Arc::new(MemoryAdapter::new())).await
    }

    pub async fn with_default_storage(default_storage: Arc<dyn ProviderAdapter>) -> Result<Self> {
        let db = setup_test_db().await?;
        Self::on_db(db, default_storage)
    }

    /// A second service instance over an existing bootstrap store.
    pub fn on_db(db: DatabaseConnection, default_storage: Arc<dyn ProviderAdapter>) -> Result<Self> {
        let probe = CountingProbe::reachable();
        let factory = MemoryFactory::new();
        let state = AppState::new(
            test_config(),
            db,
            probe.clone(),
            factory.clone(),
            default_storage.clone(),
        )?;
        Ok(Self {
            state,
            probe,
            factory,
            default_storage,
        })
    }

    /// Creates an embedded-file configuration (valid without network access).
    pub async fn create(&self, name: &str) -> Result<DatabaseConfiguration> {
        Ok(self
            .state
            .registry
            .create(NewConfiguration {
                name: name.to_string(),
                settings: ProviderSettings::EmbeddedFile {
                    file_path: Some(format!("./data/{name}.db")),
                },
                ssl: None,
                max_connections: None,
            })
            .await?)
    }

    /// Creates a configuration and marks it connected through a passing test.
    pub async fn create_connected(&self, name: &str) -> Result<DatabaseConfiguration> {
        let config = self.create(name).await?;
        self.state.registry.test(&config.id).await?;
        Ok(self.state.registry.get(&config.id).await?)
    }
}

pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

/// Inserts `rows` into `collection` and returns the assigned ids in order.
pub async fn seed(
    adapter: &dyn ProviderAdapter,
    collection: Collection,
    rows: Vec<Value>,
) -> Result<Vec<RecordId>> {
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        ids.push(adapter.insert(collection, fields(row)).await?.id);
    }
    Ok(ids)
}
