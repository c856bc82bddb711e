//! Cross-provider migration engine
//!
//! Copies every domain collection from a source adapter to a target adapter
//! in dependency order. Source identifiers are dropped on insert and foreign
//! keys are rewritten through a per-run [`RemapTable`]. Record-level failures
//! are recorded and do not abort the run.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::error::StoreError;
use crate::models::DatabaseConfiguration;
use crate::models::migration::{
    CollectionOutcome, MigrationDetails, MigrationRecord, MigrationStatus, RecordFailure,
};
use crate::providers::{
    AdapterFactory, Collection, Fields, ProviderAdapter, RecordFilter, RecordId,
};
use crate::repositories::{ConfigurationRepository, LogUpdate, MigrationLogRepository};

/// Source id to target id, scoped to one migration run.
#[derive(Debug, Default)]
pub struct RemapTable {
    ids: HashMap<(Collection, RecordId), RecordId>,
}

impl RemapTable {
    pub fn insert(&mut self, collection: Collection, source: RecordId, target: RecordId) {
        self.ids.insert((collection, source), target);
    }

    pub fn resolve(&self, collection: Collection, source: &RecordId) -> Option<&RecordId> {
        self.ids.get(&(collection, source.clone()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rewrites every foreign key of `collection` in `fields` to its target id.
    ///
    /// Null or absent references are left alone; anything unresolvable is an error.
    pub fn remap_fields(&self, collection: Collection, mut fields: Fields) -> Result<Fields, String> {
        for key in collection.foreign_keys() {
            let Some(value) = fields.get(key.field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let source = RecordId::from_value(value).ok_or_else(|| {
                format!("{} holds {value}, which is not a record id", key.field)
            })?;
            let target = self.resolve(key.references, &source).ok_or_else(|| {
                format!(
                    "{} references {}/{source}, which was not migrated",
                    key.field, key.references
                )
            })?;
            fields.insert(key.field.to_string(), target.to_value());
        }
        Ok(fields)
    }
}

/// Process-wide single-flight flag, released when dropped.
#[derive(Debug)]
pub struct MigrationGuard {
    flag: Arc<AtomicBool>,
}

impl MigrationGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for MigrationGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// A pending migration holding the single-flight guard until it has run.
#[derive(Debug)]
pub struct PreparedMigration {
    record: MigrationRecord,
    source: Option<DatabaseConfiguration>,
    target: DatabaseConfiguration,
    _guard: MigrationGuard,
}

impl PreparedMigration {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &MigrationRecord {
        &self.record
    }
}

pub struct MigrationEngine {
    logs: MigrationLogRepository,
    configs: ConfigurationRepository,
    factory: Arc<dyn AdapterFactory>,
    default_storage: Arc<dyn ProviderAdapter>,
    running: Arc<AtomicBool>,
    settings: MigrationConfig,
}

impl MigrationEngine {
    pub fn new(
        logs: MigrationLogRepository,
        configs: ConfigurationRepository,
        factory: Arc<dyn AdapterFactory>,
        default_storage: Arc<dyn ProviderAdapter>,
        settings: MigrationConfig,
    ) -> Self {
        Self {
            logs,
            configs,
            factory,
            default_storage,
            running: Arc::new(AtomicBool::new(false)),
            settings,
        }
    }

    pub async fn get(&self, id: &str) -> Result<MigrationRecord, StoreError> {
        self.logs.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        self.logs.list().await
    }

    /// Logs migrations left `in_progress` by an earlier process. They are not resumed.
    pub async fn report_stuck(&self) -> Result<usize, StoreError> {
        let stuck = self.logs.find_in_progress().await?;
        for record in &stuck {
            warn!(
                migration_id = %record.id,
                started_at = %record.started_at,
                records_migrated = record.records_migrated,
                "Migration was interrupted and remains in_progress; new migrations are blocked until it is resolved"
            );
        }
        Ok(stuck.len())
    }

    /// Validates the request and creates the `pending` record.
    pub async fn begin(
        &self,
        source_id: Option<&str>,
        target_id: &str,
    ) -> Result<PreparedMigration, StoreError> {
        if source_id == Some(target_id) {
            return Err(StoreError::validation(
                "source and target configurations must differ",
            ));
        }

        let target = self.configs.get(target_id).await?;
        if !target.is_connected {
            return Err(StoreError::NotConnected(target_id.to_string()));
        }
        let source = match source_id {
            Some(id) => Some(self.configs.get(id).await?),
            None => None,
        };

        let guard = MigrationGuard::acquire(&self.running).ok_or_else(|| {
            StoreError::MigrationInProgress("another migration is running".to_string())
        })?;

        if let Some(stuck) = self.logs.find_in_progress().await?.first() {
            return Err(StoreError::MigrationInProgress(stuck.id.clone()));
        }

        let record = MigrationRecord {
            id: Uuid::new_v4().to_string(),
            from_provider: source.as_ref().map(DatabaseConfiguration::provider),
            from_config_id: source.as_ref().map(|c| c.id.clone()),
            to_provider: target.provider(),
            to_config_id: target.id.clone(),
            status: MigrationStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            records_migrated: 0,
            error_message: None,
            migration_details: MigrationDetails::default().to_json(),
        };
        let record = self.logs.create(&record).await?;

        info!(
            migration_id = %record.id,
            from = record.from_provider.map(|p| p.as_str()).unwrap_or("default"),
            to = record.to_provider.as_str(),
            "Migration requested"
        );

        Ok(PreparedMigration {
            record,
            source,
            target,
            _guard: guard,
        })
    }

    /// `begin` followed by `run`.
    pub async fn migrate(
        &self,
        source_id: Option<&str>,
        target_id: &str,
    ) -> Result<MigrationRecord, StoreError> {
        let prepared = self.begin(source_id, target_id).await?;
        self.run(prepared).await
    }

    /// Copies every collection and sets the terminal status exactly once.
    pub async fn run(&self, prepared: PreparedMigration) -> Result<MigrationRecord, StoreError> {
        let PreparedMigration {
            record,
            source,
            target,
            _guard,
        } = prepared;
        let id = record.id.clone();
        let started = Instant::now();

        self.logs
            .apply(
                &id,
                LogUpdate {
                    status: Some(MigrationStatus::InProgress),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await?;

        let adapters = match self.open_adapters(source.as_ref(), &target).await {
            Ok(adapters) => adapters,
            Err(err) => {
                error!(migration_id = %id, error = %err, "Failed to open migration adapters");
                let failed = self
                    .logs
                    .apply(
                        &id,
                        LogUpdate {
                            status: Some(MigrationStatus::Failed),
                            error_message: Some(err.to_string()),
                            ..Default::default()
                        },
                        Utc::now(),
                    )
                    .await?;
                self.observe(&failed, started);
                return Ok(failed);
            }
        };
        let (source_adapter, target_adapter) = adapters;

        let mut remap = RemapTable::default();
        let mut details = MigrationDetails::default();
        let mut migrated: u64 = 0;

        for collection in Collection::ALL {
            let outcome = self
                .copy_collection(collection, &source_adapter, &target_adapter, &mut remap, &mut details)
                .await;
            migrated += outcome.migrated;
            details
                .collections
                .insert(collection.as_str().to_string(), outcome);

            info!(
                migration_id = %id,
                collection = collection.as_str(),
                listed = outcome.listed,
                migrated = outcome.migrated,
                failed = outcome.failed,
                "Collection migrated"
            );

            if let Err(err) = self
                .logs
                .apply(
                    &id,
                    LogUpdate {
                        records_migrated: Some(migrated),
                        migration_details: Some(details.to_json()),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .await
            {
                warn!(migration_id = %id, error = %err, "Failed to persist migration progress");
            }
        }

        let status = if details.failure_count == 0 {
            MigrationStatus::Completed
        } else {
            MigrationStatus::Failed
        };
        let finished = self
            .logs
            .apply(
                &id,
                LogUpdate {
                    status: Some(status),
                    records_migrated: Some(migrated),
                    migration_details: Some(details.to_json()),
                    error_message: details.failure_summary(self.settings.failure_sample),
                },
                Utc::now(),
            )
            .await?;

        counter!("migration_records_total").increment(migrated);
        counter!("migration_record_failures_total").increment(details.failure_count);
        self.observe(&finished, started);

        info!(
            migration_id = %id,
            status = finished.status.as_str(),
            records_migrated = finished.records_migrated,
            failures = details.failure_count,
            "Migration finished"
        );
        Ok(finished)
    }

    fn observe(&self, record: &MigrationRecord, started: Instant) {
        histogram!("migration_duration_ms", "status" => record.status.as_str())
            .record(started.elapsed().as_secs_f64() * 1_000.0);
    }

    async fn open_adapters(
        &self,
        source: Option<&DatabaseConfiguration>,
        target: &DatabaseConfiguration,
    ) -> Result<(Arc<dyn ProviderAdapter>, Arc<dyn ProviderAdapter>), StoreError> {
        let source_adapter = match source {
            Some(config) => self.factory.open(config).await.map_err(|e| {
                StoreError::unavailable(format!("cannot open source {}: {e}", config.id))
            })?,
            None => self.default_storage.clone(),
        };
        let target_adapter = self.factory.open(target).await.map_err(|e| {
            StoreError::unavailable(format!("cannot open target {}: {e}", target.id))
        })?;
        Ok((source_adapter, target_adapter))
    }

    async fn copy_collection(
        &self,
        collection: Collection,
        source: &Arc<dyn ProviderAdapter>,
        target: &Arc<dyn ProviderAdapter>,
        remap: &mut RemapTable,
        details: &mut MigrationDetails,
    ) -> CollectionOutcome {
        let mut outcome = CollectionOutcome::default();

        let records = match source.list(collection, &RecordFilter::all()).await {
            Ok(records) => records,
            Err(err) => {
                details.record_failure(RecordFailure {
                    collection: collection.as_str().to_string(),
                    source_id: None,
                    kind: err.kind().to_string(),
                    error: format!("listing source failed: {err}"),
                });
                return outcome;
            }
        };
        outcome.listed = records.len() as u64;

        let mut failures: Vec<RecordFailure> = Vec::new();
        let failure = |source_id: Option<&RecordId>, kind: &str, error: String| RecordFailure {
            collection: collection.as_str().to_string(),
            source_id: source_id.map(ToString::to_string),
            kind: kind.to_string(),
            error,
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut inserts = JoinSet::new();

        for record in records {
            let fields = match remap.remap_fields(collection, record.fields) {
                Ok(fields) => fields,
                Err(reason) => {
                    failures.push(failure(Some(&record.id), "unresolved_reference", reason));
                    continue;
                }
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                failures.push(failure(Some(&record.id), "storage", "insert slots closed".into()));
                continue;
            };
            let target = target.clone();
            let source_id = record.id;
            inserts.spawn(async move {
                let result = target.insert(collection, fields).await;
                drop(permit);
                (source_id, result)
            });
        }

        while let Some(joined) = inserts.join_next().await {
            match joined {
                Ok((source_id, Ok(inserted))) => {
                    remap.insert(collection, source_id, inserted.id);
                    outcome.migrated += 1;
                }
                Ok((source_id, Err(err))) => {
                    failures.push(failure(Some(&source_id), err.kind(), err.to_string()));
                }
                Err(join_err) => {
                    failures.push(failure(None, "storage", format!("insert task failed: {join_err}")));
                }
            }
        }

        failures.sort_by(|a, b| {
            let key = |f: &RecordFailure| f.source_id.as_deref().map(RecordId::parse);
            key(a).cmp(&key(b))
        });
        outcome.failed = failures.len() as u64;
        for entry in failures {
            details.record_failure(entry);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_remap_rewrites_foreign_keys() {
        let mut remap = RemapTable::default();
        remap.insert(Collection::Users, RecordId::Int(1), RecordId::Int(10));
        remap.insert(Collection::Accounts, RecordId::Int(2), RecordId::Text("acc-b".into()));

        let remapped = remap
            .remap_fields(
                Collection::Transactions,
                fields(json!({"user_id": 1, "account_id": "2", "category_id": null, "amount": 5})),
            )
            .unwrap();

        assert_eq!(
            Value::Object(remapped),
            json!({"user_id": 10, "account_id": "acc-b", "category_id": null, "amount": 5})
        );
    }

    #[test]
    fn test_remap_rejects_unresolved_reference() {
        let remap = RemapTable::default();
        let err = remap
            .remap_fields(Collection::Goals, fields(json!({"account_id": 3})))
            .unwrap_err();
        assert!(err.contains("accounts/3"));
        assert!(remap.is_empty());
    }

    #[test]
    fn test_remap_scoped_by_collection() {
        let mut remap = RemapTable::default();
        remap.insert(Collection::Categories, RecordId::Int(1), RecordId::Int(7));

        // users/1 was never migrated even though categories/1 was.
        assert!(
            remap
                .remap_fields(Collection::Budgets, fields(json!({"user_id": 1})))
                .is_err()
        );
        assert_eq!(remap.len(), 1);
    }

    #[test]
    fn test_guard_is_single_flight() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = MigrationGuard::acquire(&flag).unwrap();
        assert!(MigrationGuard::acquire(&flag).is_none());
        drop(first);
        assert!(MigrationGuard::acquire(&flag).is_some());
    }
}
