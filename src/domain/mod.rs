//! Domain module
//!
//! Core ledger types: amounts, currencies and stored records.

pub mod amount;
pub mod currency;
pub mod models;

pub use amount::{Amount, AmountError};
pub use currency::{Currency, CurrencyError};
pub use models::{Account, AccountId, LedgerEntry, NewAccount, Transfer, TransferResult};
