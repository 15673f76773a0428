//! Account ledger transaction engine.
//!
//! Owns the rule that a balance change and its history entry are applied in
//! one atomic unit and that no balance ever goes negative. Storage is reached
//! only through the [`LedgerStore`] / [`LedgerUnit`] contracts; diagnostics
//! leave through a [`LedgerObserver`].

pub mod account;
pub mod engine;
pub mod entry;
pub mod error;
pub mod observer;
pub mod store;

pub use account::{Account, AccountNumber, LockedAccount};
pub use engine::{EngineConfig, LedgerEngine, Receipt, Reconciliation};
pub use entry::{EntryId, EntryKind, LedgerEntry, NewLedgerEntry};
pub use error::{LedgerError, LedgerResult, StoreError};
pub use observer::{LedgerEvent, LedgerObserver, NoopObserver, RecordingObserver, UnitStage};
pub use store::{LedgerStore, LedgerUnit};
