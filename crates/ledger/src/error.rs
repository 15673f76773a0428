//! Ledger error taxonomy.
//!
//! `LedgerError` is what callers of the engine see. `StoreError` is what store
//! adapters report; the engine folds every store failure into one of the two
//! retryable ledger kinds after rolling the unit back.

use thiserror::Error;

use teller_core::{Amount, Balance};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Non-positive, over-precise or out-of-range amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Withdrawal larger than the balance observed under the row lock.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Balance, requested: Amount },

    /// The atomic unit could not be opened, executed or committed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl LedgerError {
    /// Whether the caller may retry the same request unchanged.
    ///
    /// Only infrastructure failures qualify; no partial effect survives them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_) | LedgerError::Timeout(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::AccountNotFound(_) => "account_not_found",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::StoreUnavailable(_) => "store_unavailable",
            LedgerError::Timeout(_) => "timeout",
        }
    }
}

/// Failure reported by a store adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Lock wait or statement exceeded the store-side bound.
    #[error("store timeout: {0}")]
    Timeout(String),

    /// A unique constraint rejected the write; carries the offending field.
    #[error("duplicate {0}")]
    Duplicate(String),

    /// A stored row could not be decoded into domain values.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Timeout(msg) => LedgerError::Timeout(msg),
            other => LedgerError::StoreUnavailable(other.to_string()),
        }
    }
}
