use rand::Rng;

use teller_core::DomainResult;
use teller_ledger::AccountNumber;

/// Source of fresh account numbers.
///
/// Uniqueness is enforced by the directory; generators only need to make
/// collisions unlikely.
pub trait AccountNumberGenerator: Send + Sync {
    fn generate(&self) -> DomainResult<AccountNumber>;
}

/// `prefix` followed by `digits` random decimal digits (`"10"` + 8 by default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomAccountNumbers {
    prefix: String,
    digits: usize,
}

impl RandomAccountNumbers {
    pub fn new(prefix: impl Into<String>, digits: usize) -> Self {
        Self {
            prefix: prefix.into(),
            digits,
        }
    }
}

impl Default for RandomAccountNumbers {
    fn default() -> Self {
        Self::new("10", 8)
    }
}

impl AccountNumberGenerator for RandomAccountNumbers {
    fn generate(&self) -> DomainResult<AccountNumber> {
        let mut rng = rand::thread_rng();
        let mut number = String::with_capacity(self.prefix.len() + self.digits);
        number.push_str(&self.prefix);
        for _ in 0..self.digits {
            let digit = rng.gen_range(0..10u32);
            number.push(char::from_digit(digit, 10).unwrap_or('0'));
        }
        AccountNumber::new(number)
    }
}
