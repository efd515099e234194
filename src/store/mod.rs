//! Storage capabilities
//!
//! The transfer core only needs a handful of primitives from its backing
//! store: begin/commit/rollback, a lock-for-update read, insert-only access to
//! transfers and entries, and a combined two-row balance update. Any backend
//! that provides these (natively or emulated) can run transfers.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Account, AccountId, LedgerEntry, NewAccount, Transfer};
use crate::error::InfrastructureError;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryLedgerStore, MemoryTx};
pub use postgres::{PgLedgerStore, PgTx};

/// Result type for storage primitives
pub type StoreResult<T> = Result<T, InfrastructureError>;

/// Transfer record to insert
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewTransfer {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
}

/// Ledger entry to insert (signed amount)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub amount: Decimal,
}

/// A backing store that can open atomic units of work.
///
/// The non-transactional methods are the plain CRUD accessors used around the
/// transfer core (seeding accounts, audits, reconciliation).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx + 'static;

    /// Begin an atomic transaction
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Insert an account
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account>;

    /// Read the committed state of an account
    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// All committed entries for an account, oldest first
    async fn list_entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>>;

    /// All committed transfers touching an account on either side, oldest first
    async fn list_transfers(&self, account_id: AccountId) -> StoreResult<Vec<Transfer>>;
}

/// One open unit of work.
///
/// Dropping a transaction without committing discards its writes and releases
/// every lock it holds.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read an account and hold an exclusive row lock on it until the
    /// transaction ends. Returns `None` when the row does not exist.
    async fn get_account_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Read an account as seen by this transaction, without locking
    async fn get_account(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    async fn create_transfer(&mut self, transfer: NewTransfer) -> StoreResult<Transfer>;

    async fn create_entry(&mut self, entry: NewEntry) -> StoreResult<LedgerEntry>;

    /// Debit `from` and credit `to` by `amount` as a single write.
    ///
    /// Returns the number of account rows affected.
    async fn update_transfer_balances(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
    ) -> StoreResult<u64>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
