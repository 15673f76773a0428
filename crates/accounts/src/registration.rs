use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use teller_core::AccountId;
use teller_ledger::{Account, AccountNumber, StoreError};

use crate::holder::AccountHolder;
use crate::number::{AccountNumberGenerator, RandomAccountNumbers};

/// Field names reported in [`StoreError::Duplicate`] by directories.
pub const DUPLICATE_ACCOUNT_NUMBER: &str = "account_number";
pub const DUPLICATE_NIK: &str = "nik";
pub const DUPLICATE_PHONE_NUMBER: &str = "phone_number";

const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Account row to be created with a zero balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub id: AccountId,
    pub number: AccountNumber,
    pub holder: AccountHolder,
    pub created_at: DateTime<Utc>,
}

/// Where account rows are created.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Whether an account already exists for this NIK or phone number.
    async fn holder_exists(&self, holder: &AccountHolder) -> Result<bool, StoreError>;

    /// Insert a zero-balance account. Unique violations are reported as
    /// `StoreError::Duplicate` naming the field.
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;
}

#[async_trait]
impl<D> AccountDirectory for Arc<D>
where
    D: AccountDirectory + ?Sized,
{
    async fn holder_exists(&self, holder: &AccountHolder) -> Result<bool, StoreError> {
        (**self).holder_exists(holder).await
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        (**self).create_account(account).await
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid holder data: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error("NIK or phone number already registered")]
    DuplicateHolder,

    #[error("no free account number after {0} attempts")]
    NumberSpaceExhausted(usize),

    #[error("account number generator failed: {0}")]
    Generator(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct RegistrationService<D, G = RandomAccountNumbers> {
    directory: D,
    generator: G,
    max_attempts: usize,
}

impl<D> RegistrationService<D> {
    pub fn new(directory: D) -> Self {
        Self::with_generator(directory, RandomAccountNumbers::default())
    }
}

impl<D, G> RegistrationService<D, G> {
    pub fn with_generator(directory: D, generator: G) -> Self {
        Self {
            directory,
            generator,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

impl<D, G> RegistrationService<D, G>
where
    D: AccountDirectory,
    G: AccountNumberGenerator,
{
    /// Open a zero-balance account for a new holder.
    pub async fn register(&self, nik: &str, phone_number: &str) -> Result<Account, RegistrationError> {
        let holder = AccountHolder::parse(nik, phone_number).map_err(RegistrationError::Invalid)?;

        if self.directory.holder_exists(&holder).await? {
            return Err(RegistrationError::DuplicateHolder);
        }

        for _ in 0..self.max_attempts {
            let number = self
                .generator
                .generate()
                .map_err(|e| RegistrationError::Generator(e.to_string()))?;

            let new_account = NewAccount {
                id: AccountId::new(),
                number,
                holder: holder.clone(),
                created_at: Utc::now(),
            };

            match self.directory.create_account(new_account).await {
                Ok(account) => return Ok(account),
                Err(StoreError::Duplicate(field)) if field == DUPLICATE_ACCOUNT_NUMBER => continue,
                // Another request registered the same holder since the check above.
                Err(StoreError::Duplicate(_)) => return Err(RegistrationError::DuplicateHolder),
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistrationError::NumberSpaceExhausted(self.max_attempts))
    }
}
