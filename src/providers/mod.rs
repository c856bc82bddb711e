//! # Providers
//!
//! Storage backends behind one record-collection contract ([`ProviderAdapter`]).

pub mod adapter;
pub mod collection;
pub mod factory;
pub mod kind;
pub mod memory;
pub mod rest;
pub mod sql;

pub use adapter::{Fields, ProviderAdapter, Record, RecordFilter, RecordId, TimeoutAdapter};
pub use collection::{Collection, ForeignKey};
pub use factory::{ActiveAdapter, AdapterFactory, DefaultAdapterFactory};
pub use kind::{ProviderKind, ProviderSettings, ServerCredentials, SqlDialect};
pub use memory::MemoryAdapter;
pub use rest::RestAdapter;
pub use sql::SqlAdapter;
