//! Store contracts required by the engine.
//!
//! A [`LedgerStore`] hands out [`LedgerUnit`]s (atomic units). Everything a
//! mutation touches goes through one unit, and the engine alone decides whether
//! the unit commits or rolls back.
//!
//! ## Implementation requirements
//!
//! - `lock_account_for_update` takes an exclusive lock on **one** account row
//!   and blocks only other lockers of that same row until this unit ends.
//! - Writes made through a unit are invisible to readers until `commit`.
//! - Dropping a unit without calling `commit` must discard its writes and
//!   release its locks (the engine relies on this when a unit times out).
//! - Read methods on the store observe committed state only.

use std::sync::Arc;

use async_trait::async_trait;

use teller_core::{AccountId, Balance};

use crate::account::{Account, AccountNumber, LockedAccount};
use crate::entry::{LedgerEntry, NewLedgerEntry};
use crate::error::StoreError;

/// One atomic unit against the account and history tables.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Lock the account row and return its current balance, or `None` if no
    /// account has this number.
    async fn lock_account_for_update(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<LockedAccount>, StoreError>;

    /// Overwrite the balance of an account locked by this unit.
    async fn set_balance(&mut self, account_id: AccountId, balance: Balance) -> Result<(), StoreError>;

    /// Append a history record; the store assigns its id.
    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Account + history store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: LedgerUnit;

    /// Open a new atomic unit.
    async fn begin(&self) -> Result<Self::Unit, StoreError>;

    /// Committed view of an account.
    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError>;

    /// Account and its entries (oldest first) read from one snapshot, or
    /// `None` if the account does not exist.
    async fn account_history(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    type Unit = S::Unit;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        (**self).begin().await
    }

    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        (**self).find_account(number).await
    }

    async fn account_history(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError> {
        (**self).account_history(number).await
    }
}
