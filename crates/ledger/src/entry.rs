use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teller_core::{AccountId, Amount, Balance};

use crate::error::LedgerError;

/// Store-assigned, monotonically increasing entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of a balance change. The amount itself is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
        }
    }

    /// Validate `amount` against the locked `balance` and compute the new balance.
    ///
    /// Must only be called with a balance read under the account's row lock.
    pub fn apply(self, balance: Balance, amount: Amount) -> Result<Balance, LedgerError> {
        match self {
            EntryKind::Deposit => balance
                .credit(amount)
                .map_err(|e| LedgerError::InvalidAmount(e.to_string())),
            EntryKind::Withdrawal => balance.debit(amount).ok_or(LedgerError::InsufficientFunds {
                balance,
                requested: amount,
            }),
        }
    }
}

impl core::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryKind::Deposit),
            "withdrawal" => Ok(EntryKind::Withdrawal),
            other => Err(format!("unknown entry kind '{other}'")),
        }
    }
}

impl core::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History record as handed to the store inside an atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Immutable history record of one committed balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_new(id: EntryId, entry: NewLedgerEntry) -> Self {
        Self {
            id,
            account_id: entry.account_id,
            kind: entry.kind,
            amount: entry.amount,
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn amount(v: i64) -> Amount {
        Amount::new(Decimal::from(v)).unwrap()
    }

    fn balance(v: i64) -> Balance {
        Balance::new(Decimal::from(v)).unwrap()
    }

    #[test]
    fn deposit_adds_amount() {
        assert_eq!(EntryKind::Deposit.apply(balance(500), amount(250)).unwrap(), balance(750));
    }

    #[test]
    fn withdrawal_requires_covering_balance() {
        assert_eq!(EntryKind::Withdrawal.apply(balance(500), amount(500)).unwrap(), Balance::ZERO);

        let err = EntryKind::Withdrawal.apply(balance(0), amount(100)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                balance: Balance::ZERO,
                requested: amount(100),
            }
        );
    }

    #[test]
    fn kind_parses_its_own_name() {
        for kind in [EntryKind::Deposit, EntryKind::Withdrawal] {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
        assert!("transfer".parse::<EntryKind>().is_err());
    }
}
