//! Currency
//!
//! The closed set of currencies an account can hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported account currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    USD,
    EUR,
    CAD,
}

/// Currency parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurrencyError {
    #[error("Unsupported currency: {0}. Supported currencies are: {list}", list = supported_codes())]
    Unsupported(String),
}

impl Currency {
    /// All supported currencies
    pub const fn supported() -> [Currency; 3] {
        [Currency::USD, Currency::EUR, Currency::CAD]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::CAD => "CAD",
        }
    }
}

fn supported_codes() -> String {
    Currency::supported()
        .iter()
        .map(Currency::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::supported()
            .into_iter()
            .find(|currency| currency.as_str() == s)
            .ok_or_else(|| CurrencyError::Unsupported(s.to_string()))
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.as_str().to_string()
    }
}
