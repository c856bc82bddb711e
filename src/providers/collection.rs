//! Domain entity collections and their logical references.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::StoreError;

/// A named domain collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Categories,
    Accounts,
    Products,
    Transactions,
    Budgets,
    Goals,
    Bills,
    SystemConfig,
    ActivityLogs,
}

/// A foreign-key-shaped field pointing at another collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub field: &'static str,
    pub references: Collection,
}

const fn fk(field: &'static str, references: Collection) -> ForeignKey {
    ForeignKey { field, references }
}

const OWNED: [ForeignKey; 1] = [fk("user_id", Collection::Users)];
const CATEGORIZED: [ForeignKey; 2] = [
    fk("user_id", Collection::Users),
    fk("category_id", Collection::Categories),
];
const TRANSACTION_KEYS: [ForeignKey; 4] = [
    fk("user_id", Collection::Users),
    fk("account_id", Collection::Accounts),
    fk("category_id", Collection::Categories),
    fk("product_id", Collection::Products),
];
const GOAL_KEYS: [ForeignKey; 2] = [
    fk("user_id", Collection::Users),
    fk("account_id", Collection::Accounts),
];
const BILL_KEYS: [ForeignKey; 3] = [
    fk("user_id", Collection::Users),
    fk("account_id", Collection::Accounts),
    fk("category_id", Collection::Categories),
];

impl Collection {
    /// Every collection in dependency order: referenced collections come first.
    pub const ALL: [Collection; 10] = [
        Collection::Users,
        Collection::Categories,
        Collection::Accounts,
        Collection::Products,
        Collection::Transactions,
        Collection::Budgets,
        Collection::Goals,
        Collection::Bills,
        Collection::SystemConfig,
        Collection::ActivityLogs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Categories => "categories",
            Collection::Accounts => "accounts",
            Collection::Products => "products",
            Collection::Transactions => "transactions",
            Collection::Budgets => "budgets",
            Collection::Goals => "goals",
            Collection::Bills => "bills",
            Collection::SystemConfig => "system_config",
            Collection::ActivityLogs => "activity_logs",
        }
    }

    pub fn foreign_keys(self) -> &'static [ForeignKey] {
        use Collection::*;

        match self {
            Users | SystemConfig => &[],
            Categories | Accounts | ActivityLogs => &OWNED,
            Products | Budgets => &CATEGORIZED,
            Transactions => &TRANSACTION_KEYS,
            Goals => &GOAL_KEYS,
            Bills => &BILL_KEYS,
        }
    }

    /// Field whose value must be unique within the collection, if any.
    pub fn unique_field(self) -> Option<&'static str> {
        match self {
            Collection::Users => Some("email"),
            Collection::SystemConfig => Some("key"),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StoreError::validation(format!("unknown collection '{s}'")))
    }
}
