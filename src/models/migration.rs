//! Domain view of a migration attempt and its status lifecycle.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::StoreError;
use crate::providers::ProviderKind;

/// Upper bound on individual failures kept in `migration_details`.
pub const MAX_RECORDED_FAILURES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationStatus::Completed | MigrationStatus::Failed)
    }

    /// Status only moves forward; terminal states are final.
    pub fn can_transition_to(self, next: MigrationStatus) -> bool {
        use MigrationStatus::*;

        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MigrationStatus::Pending),
            "in_progress" => Ok(MigrationStatus::InProgress),
            "completed" => Ok(MigrationStatus::Completed),
            "failed" => Ok(MigrationStatus::Failed),
            other => Err(StoreError::storage(format!(
                "unknown migration status '{other}'"
            ))),
        }
    }
}

/// Audit entry for one migration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub id: String,
    /// `None` means the in-process default storage.
    pub from_provider: Option<ProviderKind>,
    pub from_config_id: Option<String>,
    pub to_provider: ProviderKind,
    pub to_config_id: String,
    pub status: MigrationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_migrated: u64,
    pub error_message: Option<String>,
    pub migration_details: serde_json::Value,
}

/// Counts for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOutcome {
    pub listed: u64,
    pub migrated: u64,
    pub failed: u64,
}

/// One record (or a whole collection, when `source_id` is absent) that did not migrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub kind: String,
    pub error: String,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_id {
            Some(id) => write!(f, "{}/{}: {}", self.collection, id, self.error),
            None => write!(f, "{}: {}", self.collection, self.error),
        }
    }
}

/// Structured content of `migration_details`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDetails {
    pub collections: BTreeMap<String, CollectionOutcome>,
    pub failure_count: u64,
    pub failures: Vec<RecordFailure>,
}

impl MigrationDetails {
    pub fn record_failure(&mut self, failure: RecordFailure) {
        self.failure_count += 1;
        if self.failures.len() < MAX_RECORDED_FAILURES {
            self.failures.push(failure);
        }
    }

    /// Summary used as the error message of a failed migration.
    pub fn failure_summary(&self, sample: usize) -> Option<String> {
        if self.failure_count == 0 {
            return None;
        }
        let first: Vec<String> = self
            .failures
            .iter()
            .take(sample)
            .map(ToString::to_string)
            .collect();
        Some(format!(
            "{} record(s) failed to migrate; first failures: {}",
            self.failure_count,
            first.join("; ")
        ))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
