//! `teller-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money quantities and the shared domain error.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::AccountId;
pub use money::{Amount, Balance, MAX_BALANCE, MONEY_SCALE};
