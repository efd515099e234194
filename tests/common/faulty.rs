//! Fault-injecting store
//!
//! Wraps the in-memory backend and can misreport the balance update row
//! count, slow down or fail commits, or fail rollbacks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use cedar_ledger::domain::NewAccount;
use cedar_ledger::store::{MemoryTx, NewEntry, NewTransfer, StoreResult};
use cedar_ledger::{
    Account, AccountId, InfrastructureError, LedgerEntry, LedgerStore, LedgerTx,
    MemoryLedgerStore, Transfer,
};

#[derive(Debug, Default)]
struct Faults {
    under_report_update: AtomicBool,
    fail_rollback: AtomicBool,
    fail_commit: AtomicBool,
    commit_delay_ms: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    inner: MemoryLedgerStore,
    faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance updates report one row fewer than they touched
    pub fn under_report_update(&self, enabled: bool) {
        self.faults.under_report_update.store(enabled, Ordering::SeqCst);
    }

    /// Rollbacks discard the work but report failure
    pub fn fail_rollback(&self, enabled: bool) {
        self.faults.fail_rollback.store(enabled, Ordering::SeqCst);
    }

    /// Commits apply their writes, then report failure as if the
    /// confirmation was lost
    pub fn fail_commit(&self, enabled: bool) {
        self.faults.fail_commit.store(enabled, Ordering::SeqCst);
    }

    /// Commits wait this long before applying their writes
    pub fn delay_commit(&self, delay: Duration) {
        self.faults
            .commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn memory(&self) -> &MemoryLedgerStore {
        &self.inner
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    type Tx = FaultyTx;

    async fn begin(&self) -> StoreResult<FaultyTx> {
        Ok(FaultyTx {
            inner: self.inner.begin().await?,
            faults: Arc::clone(&self.faults),
        })
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.inner.create_account(account).await
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.get_account(id).await
    }

    async fn list_entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_entries(account_id).await
    }

    async fn list_transfers(&self, account_id: AccountId) -> StoreResult<Vec<Transfer>> {
        self.inner.list_transfers(account_id).await
    }
}

pub struct FaultyTx {
    inner: MemoryTx,
    faults: Arc<Faults>,
}

#[async_trait]
impl LedgerTx for FaultyTx {
    async fn get_account_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.get_account_for_update(id).await
    }

    async fn get_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.get_account(id).await
    }

    async fn create_transfer(&mut self, transfer: NewTransfer) -> StoreResult<Transfer> {
        self.inner.create_transfer(transfer).await
    }

    async fn create_entry(&mut self, entry: NewEntry) -> StoreResult<LedgerEntry> {
        self.inner.create_entry(entry).await
    }

    async fn update_transfer_balances(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
    ) -> StoreResult<u64> {
        let affected = self
            .inner
            .update_transfer_balances(from_account_id, to_account_id, amount)
            .await?;
        if self.faults.under_report_update.load(Ordering::SeqCst) {
            return Ok(affected.saturating_sub(1));
        }
        Ok(affected)
    }

    async fn commit(self) -> StoreResult<()> {
        let delay = self.faults.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.inner.commit().await?;
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(InfrastructureError::Constraint(
                "injected lost commit confirmation".to_string(),
            ));
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.inner.rollback().await?;
        if self.faults.fail_rollback.load(Ordering::SeqCst) {
            return Err(InfrastructureError::Constraint(
                "injected rollback failure".to_string(),
            ));
        }
        Ok(())
    }
}
