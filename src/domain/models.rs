//! Ledger records
//!
//! Plain data for accounts, ledger entries and transfers as they are stored,
//! plus the snapshot returned from a completed transfer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Currency;

/// Account identifier (database sequence value)
pub type AccountId = i64;

/// A balance-holding account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    /// Never negative after a committed transfer
    pub balance: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub owner: String,
    pub balance: Decimal,
    pub currency: Currency,
}

impl NewAccount {
    pub fn new(owner: impl Into<String>, balance: Decimal, currency: Currency) -> Self {
        Self {
            owner: owner.into(),
            balance,
            currency,
        }
    }
}

/// One side of a balance change.
///
/// Negative amounts are debits, positive amounts are credits. Entries are
/// append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A committed movement of funds between two accounts. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Always positive
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Read-consistent snapshot of everything a transfer wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: LedgerEntry,
    pub to_entry: LedgerEntry,
}

impl TransferResult {
    /// Amount moved by this transfer
    pub fn amount(&self) -> Decimal {
        self.transfer.amount
    }
}
