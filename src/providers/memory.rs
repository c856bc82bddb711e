//! In-process default storage, used until a configuration is activated.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;

use super::adapter::{
    Fields, ProviderAdapter, Record, RecordFilter, RecordId, merge_fields, not_found, strip_id,
    unique_key,
};
use super::{Collection, ProviderKind};
use crate::error::StoreError;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Fields>,
}

impl Table {
    fn assert_unique(
        &self,
        collection: Collection,
        fields: &Fields,
        except: Option<i64>,
    ) -> Result<(), StoreError> {
        let Some(key) = unique_key(collection, fields) else {
            return Ok(());
        };

        let taken = self
            .rows
            .iter()
            .any(|(id, row)| Some(*id) != except && unique_key(collection, row).as_ref() == Some(&key));

        if taken {
            return Err(StoreError::Conflict(format!(
                "{collection}.{} '{key}' already exists",
                collection.unique_field().unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Integer ids come from a per-collection sequence starting at 1.
#[derive(Default)]
pub struct MemoryAdapter {
    tables: RwLock<HashMap<Collection, Table>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Collection, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::storage("default storage lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Collection, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::storage("default storage lock poisoned"))
    }
}

fn int_id(collection: Collection, id: &RecordId) -> Result<i64, StoreError> {
    match id {
        RecordId::Int(id) => Ok(*id),
        RecordId::Text(_) => Err(not_found(collection, id)),
    }
}

fn to_record(id: i64, fields: &Fields) -> Record {
    Record {
        id: RecordId::Int(id),
        fields: fields.clone(),
    }
}

#[async_trait]
impl ProviderAdapter for MemoryAdapter {
    fn kind(&self) -> Option<ProviderKind> {
        None
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let tables = self.read()?;
        let Some(table) = tables.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(filter.apply(table.rows.iter().map(|(id, row)| to_record(*id, row))))
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Record, StoreError> {
        let key = int_id(collection, id)?;
        let tables = self.read()?;
        tables
            .get(&collection)
            .and_then(|table| table.rows.get(&key))
            .map(|row| to_record(key, row))
            .ok_or_else(|| not_found(collection, id))
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record, StoreError> {
        let fields = strip_id(fields);
        let mut tables = self.write()?;
        let table = tables.entry(collection).or_default();
        table.assert_unique(collection, &fields, None)?;

        table.next_id += 1;
        let id = table.next_id;
        let record = to_record(id, &fields);
        table.rows.insert(id, fields);
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Fields,
    ) -> Result<Record, StoreError> {
        let key = int_id(collection, id)?;
        let mut tables = self.write()?;
        let table = tables
            .get_mut(&collection)
            .ok_or_else(|| not_found(collection, id))?;

        let mut merged = table
            .rows
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(collection, id))?;
        merge_fields(&mut merged, partial);
        table.assert_unique(collection, &merged, Some(key))?;

        let record = to_record(key, &merged);
        table.rows.insert(key, merged);
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        let key = int_id(collection, id)?;
        let mut tables = self.write()?;
        tables
            .get_mut(&collection)
            .and_then(|table| table.rows.remove(&key))
            .map(|_| ())
            .ok_or_else(|| not_found(collection, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_crud_lifecycle() {
        let adapter = MemoryAdapter::new();

        let created = adapter
            .insert(Collection::Accounts, fields(json!({"id": 500, "name": "Checking"})))
            .await
            .unwrap();
        assert_eq!(created.id, RecordId::Int(1));

        let updated = adapter
            .update(Collection::Accounts, &created.id, fields(json!({"balance": 10})))
            .await
            .unwrap();
        assert_eq!(updated.fields.get("name"), Some(&json!("Checking")));
        assert_eq!(updated.fields.get("balance"), Some(&json!(10)));

        adapter.delete(Collection::Accounts, &created.id).await.unwrap();
        assert!(matches!(
            adapter.get(Collection::Accounts, &created.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            adapter.delete(Collection::Accounts, &created.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unique_field_conflicts() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert(Collection::Users, fields(json!({"email": "a@example.com"})))
            .await
            .unwrap();
        let second = adapter
            .insert(Collection::Users, fields(json!({"email": "b@example.com"})))
            .await
            .unwrap();

        let duplicate = adapter
            .insert(Collection::Users, fields(json!({"email": "a@example.com"})))
            .await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

        let rename = adapter
            .update(Collection::Users, &second.id, fields(json!({"email": "a@example.com"})))
            .await;
        assert!(matches!(rename, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_field() {
        let adapter = MemoryAdapter::new();
        for account in [1, 2, 1] {
            adapter
                .insert(Collection::Transactions, fields(json!({"account_id": account})))
                .await
                .unwrap();
        }

        let filter = RecordFilter::all().with_eq("account_id", 1);
        let rows = adapter.list(Collection::Transactions, &filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(adapter.list(Collection::Goals, &filter).await.unwrap().is_empty());
    }
}
