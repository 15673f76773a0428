use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teller_core::{AccountId, Balance, DomainError, DomainResult};

const MAX_ACCOUNT_NUMBER_LEN: usize = 32;

/// External account identifier handed to account holders (e.g. `"1012345678"`).
///
/// Opaque to the ledger: the format is decided by whoever issues numbers at
/// registration. The ledger only requires a short, whitespace-free token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("account number is empty"));
        }
        if trimmed.len() > MAX_ACCOUNT_NUMBER_LEN {
            return Err(DomainError::invalid_id(format!(
                "account number longer than {MAX_ACCOUNT_NUMBER_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_id("account number contains whitespace"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Committed view of an account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub number: AccountNumber,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
}

/// Account row as observed while holding its exclusive lock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LockedAccount {
    pub id: AccountId,
    pub balance: Balance,
}
