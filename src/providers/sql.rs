//! SQL-backed providers: managed and self-hosted Postgres/MySQL, and the embedded file database.
//!
//! Each collection is a table of `(id, unique_key, data, created_at, updated_at)`.
//! The record body lives in `data` as JSON, so one code path serves every dialect.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use migration::{DomainMigrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait,
    sea_query::{Alias, Expr, Order, Query},
};
use serde_json::Value;

use super::adapter::{
    Fields, ProviderAdapter, Record, RecordFilter, RecordId, merge_fields, not_found, strip_id,
    unique_key,
};
use super::{Collection, ProviderKind};
use crate::error::StoreError;

const ID: &str = "id";
const UNIQUE_KEY: &str = "unique_key";
const DATA: &str = "data";
const UPDATED_AT: &str = "updated_at";

/// Pool settings for opening a provider connection.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

fn connect_options(url: &str, pool: PoolSettings) -> ConnectOptions {
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(pool.max_connections)
        .min_connections(0)
        .connect_timeout(pool.connect_timeout)
        .acquire_timeout(pool.connect_timeout)
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    opt
}

/// Creates the parent directory of an embedded database file.
pub async fn ensure_parent_dir(file_path: &str) -> Result<(), StoreError> {
    match Path::new(file_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| {
                StoreError::unavailable(format!(
                    "cannot create directory {}: {e}",
                    parent.display()
                ))
            }),
        _ => Ok(()),
    }
}

/// Opens a single connection, runs `SELECT 1` and closes it again.
pub async fn probe(url: &str, timeout: Duration) -> Result<(), StoreError> {
    let db = Database::connect(connect_options(
        url,
        PoolSettings {
            max_connections: 1,
            connect_timeout: timeout,
        },
    ))
    .await
    .map_err(|e| StoreError::unavailable(e.to_string()))?;

    let outcome = select_one(&db).await;
    if let Err(err) = db.close().await {
        tracing::debug!(error = %err, "Failed to close probe connection");
    }
    outcome
}

async fn select_one<C: ConnectionTrait>(conn: &C) -> Result<(), StoreError> {
    conn.query_one(Statement::from_string(
        conn.get_database_backend(),
        "SELECT 1".to_string(),
    ))
    .await
    .map_err(|e| StoreError::unavailable(e.to_string()))?;
    Ok(())
}

pub struct SqlAdapter {
    kind: ProviderKind,
    db: DatabaseConnection,
}

impl SqlAdapter {
    /// Connects and prepares the domain tables.
    pub async fn connect(kind: ProviderKind, url: &str, pool: PoolSettings) -> Result<Self, StoreError> {
        let db = Database::connect(connect_options(url, pool)).await?;
        Self::with_connection(kind, db).await
    }

    /// Wraps an existing connection, preparing the domain tables.
    pub async fn with_connection(kind: ProviderKind, db: DatabaseConnection) -> Result<Self, StoreError> {
        DomainMigrator::up(&db, None).await?;
        tracing::debug!(provider = kind.as_str(), "Domain tables ready");
        Ok(Self { kind, db })
    }

    fn backend(&self) -> DatabaseBackend {
        self.db.get_database_backend()
    }

    async fn fetch<C: ConnectionTrait>(
        conn: &C,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Record, StoreError> {
        let RecordId::Int(key) = id else {
            return Err(not_found(collection, id));
        };

        let stmt = Query::select()
            .columns([Alias::new(ID), Alias::new(DATA)])
            .from(Alias::new(collection.as_str()))
            .and_where(Expr::col(Alias::new(ID)).eq(*key))
            .to_owned();

        let row = conn
            .query_one(conn.get_database_backend().build(&stmt))
            .await?
            .ok_or_else(|| not_found(collection, id))?;
        decode_row(collection, &row)
    }
}

fn decode_row(collection: Collection, row: &QueryResult) -> Result<Record, StoreError> {
    let id: i64 = row.try_get("", ID)?;
    let data: Value = row.try_get("", DATA)?;

    // Some drivers hand JSON columns back as text.
    let data = match data {
        Value::String(raw) => serde_json::from_str(&raw)?,
        other => other,
    };

    match data {
        Value::Object(fields) => Ok(Record {
            id: RecordId::Int(id),
            fields,
        }),
        _ => Err(StoreError::storage(format!(
            "{collection}/{id} does not hold a JSON object"
        ))),
    }
}

#[async_trait]
impl ProviderAdapter for SqlAdapter {
    fn kind(&self) -> Option<ProviderKind> {
        Some(self.kind)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        select_one(&self.db).await
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let mut stmt = Query::select()
            .columns([Alias::new(ID), Alias::new(DATA)])
            .from(Alias::new(collection.as_str()))
            .order_by(Alias::new(ID), Order::Asc)
            .to_owned();

        // Equality filters look inside the JSON body, so paging happens after filtering.
        let paged_in_sql = filter.equals.is_empty();
        if paged_in_sql {
            if let Some(limit) = filter.limit {
                stmt.limit(limit as u64);
            }
            if filter.offset > 0 {
                stmt.offset(filter.offset as u64);
            }
        }

        let rows = self.db.query_all(self.backend().build(&stmt)).await?;
        let records = rows
            .iter()
            .map(|row| decode_row(collection, row))
            .collect::<Result<Vec<_>, _>>()?;

        if paged_in_sql {
            Ok(records)
        } else {
            Ok(filter.apply(records))
        }
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Record, StoreError> {
        Self::fetch(&self.db, collection, id).await
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> Result<Record, StoreError> {
        let fields = strip_id(fields);
        let key = unique_key(collection, &fields);

        let mut stmt = Query::insert()
            .into_table(Alias::new(collection.as_str()))
            .columns([Alias::new(UNIQUE_KEY), Alias::new(DATA)])
            .values_panic([key.into(), Value::Object(fields.clone()).into()])
            .to_owned();

        let id = match self.backend() {
            DatabaseBackend::Postgres => {
                stmt.returning_col(Alias::new(ID));
                let row = self
                    .db
                    .query_one(self.backend().build(&stmt))
                    .await?
                    .ok_or_else(|| StoreError::storage("insert returned no id"))?;
                row.try_get::<i64>("", ID)?
            }
            _ => {
                let result = self.db.execute(self.backend().build(&stmt)).await?;
                i64::try_from(result.last_insert_id())
                    .map_err(|_| StoreError::storage("assigned id out of range"))?
            }
        };

        Ok(Record {
            id: RecordId::Int(id),
            fields,
        })
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Fields,
    ) -> Result<Record, StoreError> {
        let txn = self.db.begin().await?;
        let mut record = Self::fetch(&txn, collection, id).await?;
        merge_fields(&mut record.fields, partial);

        let RecordId::Int(key) = &record.id else {
            return Err(not_found(collection, id));
        };
        let stmt = Query::update()
            .table(Alias::new(collection.as_str()))
            .value(Alias::new(UNIQUE_KEY), unique_key(collection, &record.fields))
            .value(Alias::new(DATA), Value::Object(record.fields.clone()))
            .value(Alias::new(UPDATED_AT), Expr::current_timestamp())
            .and_where(Expr::col(Alias::new(ID)).eq(*key))
            .to_owned();

        txn.execute(self.backend().build(&stmt)).await?;
        txn.commit().await?;
        Ok(record)
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        let RecordId::Int(key) = id else {
            return Err(not_found(collection, id));
        };

        let stmt = Query::delete()
            .from_table(Alias::new(collection.as_str()))
            .and_where(Expr::col(Alias::new(ID)).eq(*key))
            .to_owned();

        let result = self.db.execute(self.backend().build(&stmt)).await?;
        if result.rows_affected() == 0 {
            return Err(not_found(collection, id));
        }
        Ok(())
    }
}
