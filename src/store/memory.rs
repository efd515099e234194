//! In-memory backend
//!
//! Emulates the database capabilities the transfer core relies on:
//! - every account slot carries its own async row mutex, held by a
//!   transaction from its lock-for-update read until commit or drop
//! - transactions buffer their writes and publish them at commit under an
//!   exclusive visibility gate, so readers only ever see committed state
//! - balances are checked against the same non-negative constraint as the
//!   `accounts` table
//!
//! Lock ordering is left to the caller, exactly as with the database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::{Account, AccountId, LedgerEntry, NewAccount, Transfer};
use crate::error::InfrastructureError;

use super::{LedgerStore, LedgerTx, NewEntry, NewTransfer, StoreResult};

struct AccountSlot {
    row_lock: Arc<Mutex<()>>,
    committed: RwLock<Account>,
}

struct Inner {
    accounts: DashMap<AccountId, Arc<AccountSlot>>,
    entries: RwLock<Vec<LedgerEntry>>,
    transfers: RwLock<Vec<Transfer>>,
    /// Shared by readers, exclusive while a commit publishes its writes
    visibility: RwLock<()>,
    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,
    next_transfer_id: AtomicI64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            accounts: DashMap::new(),
            entries: RwLock::new(Vec::new()),
            transfers: RwLock::new(Vec::new()),
            visibility: RwLock::new(()),
            next_account_id: AtomicI64::new(1),
            next_entry_id: AtomicI64::new(1),
            next_transfer_id: AtomicI64::new(1),
        }
    }
}

impl Inner {
    /// Clone the slot out so no DashMap shard guard is held across an await
    fn slot(&self, id: AccountId) -> Option<Arc<AccountSlot>> {
        self.accounts.get(&id).map(|slot| Arc::clone(slot.value()))
    }

    async fn read_committed(&self, id: AccountId) -> Option<Account> {
        let slot = self.slot(id)?;
        let _visible = self.visibility.read().await;
        let account = slot.committed.read().await.clone();
        Some(account)
    }

    fn ensure_exists(&self, id: AccountId, what: &str) -> StoreResult<()> {
        if self.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(InfrastructureError::Constraint(format!(
                "{what} references missing account {id}"
            )))
        }
    }
}

/// Shared in-process ledger store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed transfers
    pub async fn transfer_count(&self) -> usize {
        let _visible = self.inner.visibility.read().await;
        self.inner.transfers.read().await.len()
    }

    /// Number of committed ledger entries
    pub async fn entry_count(&self) -> usize {
        let _visible = self.inner.visibility.read().await;
        self.inner.entries.read().await.len()
    }
}

impl std::fmt::Debug for MemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedgerStore")
            .field("accounts", &self.inner.accounts.len())
            .finish()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            locked: HashMap::new(),
            pending_transfers: Vec::new(),
            pending_entries: Vec::new(),
        })
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        if account.balance < Decimal::ZERO {
            return Err(InfrastructureError::Constraint(format!(
                "initial balance {} is negative",
                account.balance
            )));
        }

        let id = self.inner.next_account_id.fetch_add(1, Ordering::SeqCst);
        let account = Account {
            id,
            owner: account.owner,
            balance: account.balance,
            currency: account.currency,
            created_at: Utc::now(),
        };

        self.inner.accounts.insert(
            id,
            Arc::new(AccountSlot {
                row_lock: Arc::new(Mutex::new(())),
                committed: RwLock::new(account.clone()),
            }),
        );

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.inner.read_committed(id).await)
    }

    async fn list_entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        let _visible = self.inner.visibility.read().await;
        let entries = self.inner.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_transfers(&self, account_id: AccountId) -> StoreResult<Vec<Transfer>> {
        let _visible = self.inner.visibility.read().await;
        let transfers = self.inner.transfers.read().await;
        Ok(transfers
            .iter()
            .filter(|t| t.from_account_id == account_id || t.to_account_id == account_id)
            .cloned()
            .collect())
    }
}

/// A row held by a transaction: the lock guard plus the transaction's view
struct LockedRow {
    slot: Arc<AccountSlot>,
    staged: Account,
    _guard: OwnedMutexGuard<()>,
}

/// Open in-memory transaction.
///
/// Dropping it discards buffered writes and releases its row locks.
pub struct MemoryTx {
    inner: Arc<Inner>,
    locked: HashMap<AccountId, LockedRow>,
    pending_transfers: Vec<Transfer>,
    pending_entries: Vec<LedgerEntry>,
}

impl MemoryTx {
    /// Account ids this transaction currently holds row locks on
    pub fn locked_accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.locked.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn lock_row(&mut self, id: AccountId) -> Option<&mut LockedRow> {
        if !self.locked.contains_key(&id) {
            let slot = self.inner.slot(id)?;
            let guard = Arc::clone(&slot.row_lock).lock_owned().await;
            let staged = slot.committed.read().await.clone();
            self.locked.insert(
                id,
                LockedRow {
                    slot,
                    staged,
                    _guard: guard,
                },
            );
        }
        self.locked.get_mut(&id)
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn get_account_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.lock_row(id).await.map(|row| row.staged.clone()))
    }

    async fn get_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        if let Some(row) = self.locked.get(&id) {
            return Ok(Some(row.staged.clone()));
        }
        Ok(self.inner.read_committed(id).await)
    }

    async fn create_transfer(&mut self, transfer: NewTransfer) -> StoreResult<Transfer> {
        self.inner.ensure_exists(transfer.from_account_id, "transfer")?;
        self.inner.ensure_exists(transfer.to_account_id, "transfer")?;
        if transfer.amount <= Decimal::ZERO {
            return Err(InfrastructureError::Constraint(format!(
                "transfer amount {} must be positive",
                transfer.amount
            )));
        }

        let record = Transfer {
            id: self.inner.next_transfer_id.fetch_add(1, Ordering::SeqCst),
            from_account_id: transfer.from_account_id,
            to_account_id: transfer.to_account_id,
            amount: transfer.amount,
            created_at: Utc::now(),
        };
        self.pending_transfers.push(record.clone());
        Ok(record)
    }

    async fn create_entry(&mut self, entry: NewEntry) -> StoreResult<LedgerEntry> {
        self.inner.ensure_exists(entry.account_id, "entry")?;

        let record = LedgerEntry {
            id: self.inner.next_entry_id.fetch_add(1, Ordering::SeqCst),
            account_id: entry.account_id,
            amount: entry.amount,
            created_at: Utc::now(),
        };
        self.pending_entries.push(record.clone());
        Ok(record)
    }

    async fn update_transfer_balances(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
    ) -> StoreResult<u64> {
        let mut ids = vec![from_account_id, to_account_id];
        ids.sort_unstable();
        ids.dedup();

        // Compute every new balance before touching any, like one statement.
        let mut updates = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(row) = self.lock_row(id).await else {
                continue;
            };
            let mut delta = Decimal::ZERO;
            if id == from_account_id {
                delta -= amount;
            }
            if id == to_account_id {
                delta += amount;
            }
            let new_balance = row.staged.balance + delta;
            if new_balance < Decimal::ZERO {
                return Err(InfrastructureError::Constraint(format!(
                    "balance of account {id} would become {new_balance}"
                )));
            }
            updates.push((id, new_balance));
        }

        for (id, new_balance) in &updates {
            if let Some(row) = self.locked.get_mut(id) {
                row.staged.balance = *new_balance;
            }
        }

        Ok(updates.len() as u64)
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTx {
            inner,
            locked,
            pending_transfers,
            pending_entries,
        } = self;

        let _publish = inner.visibility.write().await;
        for row in locked.values() {
            *row.slot.committed.write().await = row.staged.clone();
        }
        inner.entries.write().await.extend(pending_entries);
        inner.transfers.write().await.extend(pending_transfers);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
