//! The uniform record-collection contract every provider implements.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::{Collection, ProviderKind};
use crate::error::StoreError;

/// Record body without its identifier.
pub type Fields = serde_json::Map<String, Value>;

/// Provider-local record identifier. Never assumed portable across providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Parses a path or query value; numeric strings become integer ids.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        trimmed
            .parse::<i64>()
            .map(RecordId::Int)
            .unwrap_or_else(|_| RecordId::Text(trimmed.to_string()))
    }

    /// Reads an identifier out of a JSON field value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) if !s.trim().is_empty() => Some(RecordId::parse(s)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(id) => Value::from(*id),
            RecordId::Text(id) => Value::from(id.as_str()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

/// A record as stored by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Builds a record from a flat JSON object carrying its own `id`.
    pub fn from_row(mut row: Fields) -> Result<Self, StoreError> {
        let id = row
            .remove("id")
            .as_ref()
            .and_then(RecordId::from_value)
            .ok_or_else(|| StoreError::storage("record is missing an id"))?;
        Ok(Record { id, fields: row })
    }
}

/// Equality filter plus paging. Results are always ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub equals: BTreeMap<String, Value>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.equals.iter().all(|(field, expected)| {
            if field == "id" {
                RecordId::from_value(expected).as_ref() == Some(&record.id)
            } else {
                record.fields.get(field) == Some(expected)
            }
        })
    }

    /// Applies the equality filter, id ordering and paging to `records`.
    pub fn apply(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut matching: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Drops any caller-supplied identifier; adapters assign their own.
pub fn strip_id(mut fields: Fields) -> Fields {
    fields.remove("id");
    fields
}

/// Shallow merge of `partial` into `target`, ignoring `id`.
pub fn merge_fields(target: &mut Fields, partial: Fields) {
    for (key, value) in strip_id(partial) {
        target.insert(key, value);
    }
}

/// Value of the collection's unique field, normalized to a string key.
pub fn unique_key(collection: Collection, fields: &Fields) -> Option<String> {
    let field = collection.unique_field()?;
    match fields.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Uniform CRUD over the domain collections of one configuration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider kind, `None` for the in-process default storage.
    fn kind(&self) -> Option<ProviderKind>;

    /// Lightweight reachability check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError>;

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Record, StoreError>;

    /// Inserts `fields` (any `id` is ignored) and returns the record with its assigned id.
    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record, StoreError>;

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Fields,
    ) -> Result<Record, StoreError>;

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError>;
}

pub(crate) fn not_found(collection: Collection, id: &RecordId) -> StoreError {
    StoreError::NotFound(format!("{collection}/{id}"))
}

/// Decorator bounding every operation of the inner adapter by a timeout.
pub struct TimeoutAdapter {
    inner: Arc<dyn ProviderAdapter>,
    timeout: Duration,
}

impl TimeoutAdapter {
    pub fn new(inner: Arc<dyn ProviderAdapter>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(
                    provider = self.inner.kind().map(ProviderKind::as_str),
                    operation,
                    timeout_ms,
                    "Provider operation timed out"
                );
                Err(StoreError::Unavailable(format!(
                    "{operation} timed out after {timeout_ms}ms"
                )))
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for TimeoutAdapter {
    fn kind(&self) -> Option<ProviderKind> {
        self.inner.kind()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping", self.inner.ping()).await
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.bounded("list", self.inner.list(collection, filter))
            .await
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Record, StoreError> {
        self.bounded("get", self.inner.get(collection, id)).await
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record, StoreError> {
        self.bounded("insert", self.inner.insert(collection, fields))
            .await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Fields,
    ) -> Result<Record, StoreError> {
        self.bounded("update", self.inner.update(collection, id, partial))
            .await
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        self.bounded("delete", self.inner.delete(collection, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MemoryAdapter;
    use serde_json::json;

    struct StalledAdapter;

    #[async_trait]
    impl ProviderAdapter for StalledAdapter {
        fn kind(&self) -> Option<ProviderKind> {
            Some(ProviderKind::PostgresManaged)
        }

        async fn ping(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn list(&self, _: Collection, _: &RecordFilter) -> Result<Vec<Record>, StoreError> {
            std::future::pending().await
        }

        async fn get(&self, _: Collection, _: &RecordId) -> Result<Record, StoreError> {
            std::future::pending().await
        }

        async fn insert(&self, _: Collection, _: Fields) -> Result<Record, StoreError> {
            std::future::pending().await
        }

        async fn update(&self, _: Collection, _: &RecordId, _: Fields) -> Result<Record, StoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _: Collection, _: &RecordId) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_record_id_parsing() {
        assert_eq!(RecordId::parse("42"), RecordId::Int(42));
        assert_eq!(RecordId::parse("abc-1"), RecordId::Text("abc-1".into()));
        assert_eq!(RecordId::from_value(&json!("7")), Some(RecordId::Int(7)));
        assert_eq!(RecordId::from_value(&json!(null)), None);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = Record {
            id: RecordId::Int(3),
            fields: fields(json!({"name": "Checking"})),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": 3, "name": "Checking"})
        );
    }

    #[test]
    fn test_filter_orders_and_pages() {
        let records = (1..=5).rev().map(|i| Record {
            id: RecordId::Int(i),
            fields: fields(json!({"parity": i % 2})),
        });

        let filter = RecordFilter {
            limit: Some(2),
            offset: 1,
            ..RecordFilter::all().with_eq("parity", 1)
        };
        let ids: Vec<RecordId> = filter.apply(records).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RecordId::Int(3), RecordId::Int(5)]);
    }

    #[test]
    fn test_merge_ignores_id() {
        let mut target = fields(json!({"name": "a", "balance": 1}));
        merge_fields(&mut target, fields(json!({"id": 99, "balance": 2})));
        assert_eq!(Value::Object(target), json!({"name": "a", "balance": 2}));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let adapter = TimeoutAdapter::new(Arc::new(StalledAdapter), Duration::from_millis(20));

        let err = adapter
            .list(Collection::Accounts, &RecordFilter::all())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(m) if m.contains("list")));
    }

    #[tokio::test]
    async fn test_timeout_passes_through_results() {
        let adapter = TimeoutAdapter::new(Arc::new(MemoryAdapter::new()), Duration::from_secs(1));

        let inserted = adapter
            .insert(Collection::Accounts, fields(json!({"name": "Savings"})))
            .await
            .unwrap();
        let fetched = adapter.get(Collection::Accounts, &inserted.id).await.unwrap();
        assert_eq!(fetched, inserted);
    }
}
