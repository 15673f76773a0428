//! Request/response DTOs.
//!
//! Amounts travel as JSON numbers. Requests also accept decimal strings
//! (`"100.50"`), which avoids float rounding for clients that care.
//!
//! Numeric output goes through `f64`, which holds every cent only up to
//! about 9e13. Balance-bearing responses therefore also carry
//! `balance_exact`, the decimal as a string, valid across the whole
//! `MAX_BALANCE` range.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use teller_core::Balance;
use teller_ledger::{EntryKind, LedgerEntry, Reconciliation};

#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub nik: String,
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterAccountResponse {
    pub account_number: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub account_number: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub remark: &'static str,
    /// Rounded to `f64`; see `balance_exact`.
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub balance_exact: String,
}

impl TransactionResponse {
    pub fn new(remark: &'static str, balance: Balance) -> Self {
        Self {
            remark,
            balance: balance.value(),
            balance_exact: balance.value().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_number: String,
    /// Rounded to `f64`; see `balance_exact`.
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub balance_exact: String,
}

impl BalanceResponse {
    pub fn new(account_number: String, balance: Balance) -> Self {
        Self {
            account_number,
            balance: balance.value(),
            balance_exact: balance.value().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntryDto {
    pub id: i64,
    pub kind: EntryKind,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for EntryDto {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.0,
            kind: entry.kind,
            amount: entry.amount.value(),
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub account_number: String,
    pub entries: Vec<EntryDto>,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationResponse {
    pub account_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_deposits: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_withdrawals: Decimal,
    pub entry_count: usize,
    pub consistent: bool,
}

impl From<Reconciliation> for ReconciliationResponse {
    fn from(r: Reconciliation) -> Self {
        Self {
            account_number: r.account_number.to_string(),
            balance: r.balance.value(),
            total_deposits: r.total_deposits,
            total_withdrawals: r.total_withdrawals,
            entry_count: r.entry_count,
            consistent: r.consistent,
        }
    }
}
