//! Ledger engine: the only writer of balances and history entries.
//!
//! Every mutation runs the same sequence inside one atomic unit:
//!
//! ```text
//! begin → lock account row → read balance → validate → write balance
//!       → append entry → commit
//! ```
//!
//! Validation always uses the balance observed under the row lock, so two
//! concurrent withdrawals can never both pass against a stale value. Deposits
//! take the same lock; they would otherwise lose updates just the same.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use teller_core::{AccountId, Amount, Balance};

use crate::account::AccountNumber;
use crate::entry::{EntryKind, LedgerEntry, NewLedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::observer::{LedgerEvent, LedgerObserver, NoopObserver, UnitStage};
use crate::store::{LedgerStore, LedgerUnit};

/// Default bound on one atomic unit up to its commit, lock wait included.
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single atomic unit up to its commit (or on a read).
    /// On expiry the unit is dropped, which rolls it back and releases the
    /// row lock. The commit itself is bounded by the store.
    pub unit_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
        }
    }
}

/// Outcome of a committed deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub account_id: AccountId,
    pub account_number: AccountNumber,
    pub previous_balance: Balance,
    pub balance: Balance,
    pub entry: LedgerEntry,
}

/// Result of checking an account's balance against its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub account_number: AccountNumber,
    pub balance: Balance,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub entry_count: usize,
    /// `total_deposits - total_withdrawals == balance`.
    pub consistent: bool,
}

#[derive(Debug)]
pub struct LedgerEngine<S, O = NoopObserver> {
    store: S,
    observer: O,
    config: EngineConfig,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            observer: NoopObserver,
            config: EngineConfig::default(),
        }
    }
}

impl<S, O> LedgerEngine<S, O> {
    pub fn with_observer<P>(self, observer: P) -> LedgerEngine<S, P> {
        LedgerEngine {
            store: self.store,
            observer,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

impl<S, O> LedgerEngine<S, O>
where
    S: LedgerStore,
    O: LedgerObserver,
{
    /// Credit `amount` to the account and return the new balance.
    pub async fn deposit(&self, account_number: &str, amount: Decimal) -> LedgerResult<Balance> {
        self.post(account_number, EntryKind::Deposit, amount)
            .await
            .map(|receipt| receipt.balance)
    }

    /// Debit `amount` from the account and return the new balance.
    pub async fn withdraw(&self, account_number: &str, amount: Decimal) -> LedgerResult<Balance> {
        self.post(account_number, EntryKind::Withdrawal, amount)
            .await
            .map(|receipt| receipt.balance)
    }

    /// Run one mutation through a bounded atomic unit.
    pub async fn post(
        &self,
        account_number: &str,
        kind: EntryKind,
        amount: Decimal,
    ) -> LedgerResult<Receipt> {
        let (number, amount) = match Self::parse_request(account_number, amount) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.observer.observe(&LedgerEvent::Refused {
                    kind,
                    account_number: account_number.to_string(),
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        let timeout = self.config.unit_timeout;
        let prepared = tokio::time::timeout(timeout, self.prepare_unit(&number, kind, amount)).await;
        let (unit, receipt) = match prepared {
            Ok(prepared) => prepared?,
            Err(_) => {
                self.observer.observe(&LedgerEvent::TimedOut {
                    kind,
                    account_number: number.to_string(),
                    after: timeout,
                });
                return Err(LedgerError::Timeout(format!(
                    "{kind} on {number} did not finish within {timeout:?}"
                )));
            }
        };

        // Not under `unit_timeout`: once the commit is sent its effect may be
        // durable, so it must never surface as a retryable timeout. The store
        // bounds it (statement timeout, connection timeout).
        self.commit_unit(unit, &number, kind, amount, receipt).await
    }

    /// Committed balance of the account.
    pub async fn get_balance(&self, account_number: &str) -> LedgerResult<Balance> {
        let number = Self::parse_number(account_number)?;
        let account = self
            .bounded(self.store.find_account(&number))
            .await??
            .ok_or_else(|| LedgerError::AccountNotFound(number.to_string()))?;
        Ok(account.balance)
    }

    /// Committed history of the account, oldest entry first.
    pub async fn get_history(&self, account_number: &str) -> LedgerResult<Vec<LedgerEntry>> {
        let number = Self::parse_number(account_number)?;
        let (_, entries) = self
            .bounded(self.store.account_history(&number))
            .await??
            .ok_or_else(|| LedgerError::AccountNotFound(number.to_string()))?;
        Ok(entries)
    }

    /// Compare the committed balance with the sum of its history.
    pub async fn reconcile(&self, account_number: &str) -> LedgerResult<Reconciliation> {
        let number = Self::parse_number(account_number)?;
        let (account, entries) = self
            .bounded(self.store.account_history(&number))
            .await??
            .ok_or_else(|| LedgerError::AccountNotFound(number.to_string()))?;

        let (total_deposits, total_withdrawals) =
            entries
                .iter()
                .fold((Decimal::ZERO, Decimal::ZERO), |(dep, wd), e| match e.kind {
                    EntryKind::Deposit => (dep + e.amount.value(), wd),
                    EntryKind::Withdrawal => (dep, wd + e.amount.value()),
                });

        Ok(Reconciliation {
            account_number: account.number,
            balance: account.balance,
            total_deposits,
            total_withdrawals,
            entry_count: entries.len(),
            consistent: total_deposits - total_withdrawals == account.balance.value(),
        })
    }

    fn parse_number(account_number: &str) -> LedgerResult<AccountNumber> {
        // A malformed number cannot belong to any account.
        AccountNumber::new(account_number)
            .map_err(|_| LedgerError::AccountNotFound(account_number.to_string()))
    }

    fn parse_request(account_number: &str, amount: Decimal) -> LedgerResult<(AccountNumber, Amount)> {
        let amount = Amount::new(amount).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
        let number = Self::parse_number(account_number)?;
        Ok((number, amount))
    }

    async fn bounded<T, F>(&self, fut: F) -> LedgerResult<T>
    where
        F: Future<Output = T>,
    {
        let timeout = self.config.unit_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| LedgerError::Timeout(format!("read did not finish within {timeout:?}")))
    }

    /// Everything up to (not including) the commit. On error the unit is
    /// already rolled back; on timeout the dropped unit rolls itself back.
    async fn prepare_unit(
        &self,
        number: &AccountNumber,
        kind: EntryKind,
        amount: Amount,
    ) -> LedgerResult<(S::Unit, Receipt)> {
        let mut unit = match self.store.begin().await {
            Ok(unit) => unit,
            Err(e) => {
                let error = LedgerError::from(e);
                self.rolled_back(kind, number, UnitStage::Idle, &error);
                return Err(error);
            }
        };

        let mut stage = UnitStage::Idle;
        match apply_in_unit(&mut unit, number, kind, amount, &mut stage).await {
            Ok(receipt) => Ok((unit, receipt)),
            Err(error) => {
                if let Err(e) = unit.rollback().await {
                    self.observer.observe(&LedgerEvent::RollbackFailed {
                        kind,
                        account_number: number.to_string(),
                        reason: e.to_string(),
                    });
                }
                self.rolled_back(kind, number, stage, &error);
                Err(error)
            }
        }
    }

    async fn commit_unit(
        &self,
        unit: S::Unit,
        number: &AccountNumber,
        kind: EntryKind,
        amount: Amount,
        receipt: Receipt,
    ) -> LedgerResult<Receipt> {
        if let Err(e) = unit.commit().await {
            let error = LedgerError::from(e);
            self.rolled_back(kind, number, UnitStage::Applied, &error);
            return Err(error);
        }
        self.observer.observe(&LedgerEvent::Committed {
            kind,
            account_number: number.to_string(),
            account_id: receipt.account_id,
            amount,
            previous_balance: receipt.previous_balance,
            balance: receipt.balance,
            entry_id: receipt.entry.id,
        });
        Ok(receipt)
    }

    fn rolled_back(&self, kind: EntryKind, number: &AccountNumber, stage: UnitStage, error: &LedgerError) {
        self.observer.observe(&LedgerEvent::RolledBack {
            kind,
            account_number: number.to_string(),
            stage,
            error: error.clone(),
        });
    }
}

async fn apply_in_unit<U: LedgerUnit>(
    unit: &mut U,
    number: &AccountNumber,
    kind: EntryKind,
    amount: Amount,
    stage: &mut UnitStage,
) -> LedgerResult<Receipt> {
    let locked = unit
        .lock_account_for_update(number)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(number.to_string()))?;
    *stage = UnitStage::LockAcquired;

    let balance = kind.apply(locked.balance, amount)?;
    *stage = UnitStage::Validated;

    unit.set_balance(locked.id, balance).await?;
    *stage = UnitStage::Applied;

    let entry = unit
        .append_entry(NewLedgerEntry {
            account_id: locked.id,
            kind,
            amount,
            created_at: Utc::now(),
        })
        .await?;

    Ok(Receipt {
        account_id: locked.id,
        account_number: number.clone(),
        previous_balance: locked.balance,
        balance,
        entry,
    })
}
