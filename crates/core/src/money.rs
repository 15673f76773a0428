//! Money quantities.
//!
//! Amounts and balances are fixed-point decimals with at most [`MONEY_SCALE`]
//! fractional digits. The upper bound matches a `NUMERIC(20, 2)` column so a
//! value accepted here is always storable.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Maximum number of fractional digits carried by money values.
pub const MONEY_SCALE: u32 = 2;

/// Largest representable balance: `999_999_999_999_999_999.99`.
pub const MAX_BALANCE: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, MONEY_SCALE);

fn check_scale(value: Decimal, what: &str) -> DomainResult<Decimal> {
    let normalized = value.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(DomainError::validation(format!(
            "{what} must have at most {MONEY_SCALE} decimal places (got {value})"
        )));
    }
    Ok(normalized)
}

/// Strictly positive quantity moved by a single deposit or withdrawal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "amount must be greater than zero (got {value})"
            )));
        }
        let value = check_scale(value, "amount")?;
        if value > MAX_BALANCE {
            return Err(DomainError::validation(format!("amount {value} exceeds {MAX_BALANCE}")));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Non-negative account balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Balance(Decimal);

impl Balance {
    pub const ZERO: Balance = Balance(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ZERO {
            return Err(DomainError::invariant(format!("balance cannot be negative (got {value})")));
        }
        let value = check_scale(value, "balance")?;
        if value > MAX_BALANCE {
            return Err(DomainError::invariant(format!("balance {value} exceeds {MAX_BALANCE}")));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Balance after adding `amount`.
    ///
    /// Fails when the result would leave the storable range.
    pub fn credit(self, amount: Amount) -> DomainResult<Balance> {
        let next = self
            .0
            .checked_add(amount.0)
            .ok_or_else(|| DomainError::validation("balance overflow"))?;
        if next > MAX_BALANCE {
            return Err(DomainError::validation(format!(
                "deposit of {amount} would exceed the maximum balance {MAX_BALANCE}"
            )));
        }
        Ok(Self(next))
    }

    /// Balance after removing `amount`, or `None` when funds are insufficient.
    pub fn debit(self, amount: Amount) -> Option<Balance> {
        if self.0 < amount.0 {
            return None;
        }
        Some(Self(self.0 - amount.0))
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<Decimal> for Balance {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Balance> for Decimal {
    fn from(value: Balance) -> Self {
        value.0
    }
}

impl core::fmt::Display for Balance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
