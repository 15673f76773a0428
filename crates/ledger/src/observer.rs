//! Side-channel diagnostics for the engine.
//!
//! The engine never logs. It reports what happened to each atomic unit to a
//! [`LedgerObserver`] chosen by whoever builds the engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use teller_core::{AccountId, Amount, Balance};

use crate::entry::{EntryId, EntryKind};
use crate::error::LedgerError;

/// Progress of one mutating call through its atomic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStage {
    Idle,
    LockAcquired,
    Validated,
    Applied,
}

impl UnitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStage::Idle => "idle",
            UnitStage::LockAcquired => "lock_acquired",
            UnitStage::Validated => "validated",
            UnitStage::Applied => "applied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// Request rejected before any unit was opened.
    Refused {
        kind: EntryKind,
        account_number: String,
        error: LedgerError,
    },
    Committed {
        kind: EntryKind,
        account_number: String,
        account_id: AccountId,
        amount: Amount,
        previous_balance: Balance,
        balance: Balance,
        entry_id: EntryId,
    },
    /// The unit ended without effect; `stage` is the last stage it reached.
    RolledBack {
        kind: EntryKind,
        account_number: String,
        stage: UnitStage,
        error: LedgerError,
    },
    /// Explicit rollback failed; the store discards the unit on drop anyway.
    RollbackFailed {
        kind: EntryKind,
        account_number: String,
        reason: String,
    },
    TimedOut {
        kind: EntryKind,
        account_number: String,
        after: Duration,
    },
}

pub trait LedgerObserver: Send + Sync {
    fn observe(&self, event: &LedgerEvent);
}

impl<O> LedgerObserver for Arc<O>
where
    O: LedgerObserver + ?Sized,
{
    fn observe(&self, event: &LedgerEvent) {
        (**self).observe(event)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LedgerObserver for NoopObserver {
    fn observe(&self, _event: &LedgerEvent) {}
}

/// Keeps every event in memory. Intended for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl LedgerObserver for RecordingObserver {
    fn observe(&self, event: &LedgerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
