//! Infrastructure layer: configuration and store adapters.

pub mod config;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, ConfigError, DatabaseConfig, StorageConfig};
pub use store::{InMemoryLedgerStore, PostgresLedgerStore};
