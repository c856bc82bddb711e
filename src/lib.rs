//! # Fintrack Storage Library
//!
//! Database provider administration for Fintrack: sealed provider
//! configurations, connection testing, single-active activation, entity CRUD
//! through the active provider and cross-provider data migration.

pub mod config;
pub mod crypto;
pub mod db;
pub mod env_template;
pub mod error;
pub mod handlers;
pub mod migration_engine;
pub mod models;
pub mod providers;
pub mod registry;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod tester;
pub use migration;
