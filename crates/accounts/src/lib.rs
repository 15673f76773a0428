//! Account holders and account opening.
//!
//! Validates holder identity fields, issues account numbers and creates the
//! zero-balance account rows the ledger later mutates. The ledger itself never
//! generates identifiers.

pub mod holder;
pub mod number;
pub mod registration;

pub use holder::{AccountHolder, Nik, PhoneNumber};
pub use number::{AccountNumberGenerator, RandomAccountNumbers};
pub use registration::{
    AccountDirectory, DUPLICATE_ACCOUNT_NUMBER, DUPLICATE_NIK, DUPLICATE_PHONE_NUMBER, NewAccount,
    RegistrationError, RegistrationService,
};
