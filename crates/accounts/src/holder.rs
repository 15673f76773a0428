use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use teller_core::{DomainError, DomainResult};

// Province code, regency, district, birth day (+40 for women), month, year, serial.
static NIK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(1[1-9]|21|[37][1-6]|5[1-3]|6[1-5]|[89][12])\d{2}\d{2}([04][1-9]|[1256][0-9]|[37][01])(0[1-9]|1[0-2])\d{2}\d{4}$",
    )
    .expect("NIK pattern is valid")
});

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10,15}$").expect("phone pattern is valid"));

/// Indonesian national identity number (16 digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nik(String);

impl Nik {
    pub fn parse(value: &str) -> DomainResult<Self> {
        let value = value.trim();
        if !NIK_PATTERN.is_match(value) {
            return Err(DomainError::validation("invalid NIK format"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Nik {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Nik> for String {
    fn from(value: Nik) -> Self {
        value.0
    }
}

/// Holder phone number, digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(value: &str) -> DomainResult<Self> {
        let value = value.trim();
        if !PHONE_PATTERN.is_match(value) {
            return Err(DomainError::validation("phone number must be 10-15 digits"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

/// Identity of the person owning an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHolder {
    pub nik: Nik,
    pub phone_number: PhoneNumber,
}

impl AccountHolder {
    /// Validate both fields, collecting every problem instead of stopping at the first.
    pub fn parse(nik: &str, phone_number: &str) -> Result<Self, Vec<String>> {
        let nik = Nik::parse(nik);
        let phone_number = PhoneNumber::parse(phone_number);
        match (nik, phone_number) {
            (Ok(nik), Ok(phone_number)) => Ok(Self { nik, phone_number }),
            (nik, phone_number) => Err([nik.err(), phone_number.err()]
                .into_iter()
                .flatten()
                .map(|e| match e {
                    DomainError::Validation(msg) => msg,
                    other => other.to_string(),
                })
                .collect()),
        }
    }
}
