//! Store adapters implementing the ledger and account directory contracts.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryLedgerStore, InMemoryUnit};
pub use postgres::{PostgresLedgerStore, PostgresUnit};
