//! cedar-ledger Library
//!
//! Ledger-style fund transfers: each transfer atomically debits one account,
//! credits another and appends an audit trail of ledger entries.

pub mod config;
pub mod db;
pub mod domain;
pub mod store;
pub mod telemetry;
pub mod transfer;
mod error;

pub use config::{Config, ConfigError, LogFormat};
pub use domain::{Account, AccountId, Amount, AmountError, Currency, LedgerEntry, Transfer, TransferResult};
pub use error::{InfrastructureError, TransferError, TransferOutcome};
pub use store::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore};
pub use transfer::{TransactionCoordinator, TransferParams, TransferService, TransferStage};
