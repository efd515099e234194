//! Transaction Coordinator
//!
//! Scoped all-or-nothing execution against a [`LedgerStore`], plus the
//! canonical lock order every transfer uses.
//!
//! Deadlock freedom rests on lock order alone: both account rows are locked
//! lowest id first, whatever the transfer direction, so two transfers sharing
//! accounts always queue on the same row first. The single-statement balance
//! update only keeps the two balance writes atomic.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::domain::{Account, AccountId};
use crate::error::{InfrastructureError, TransferError, TransferOutcome};
use crate::store::{LedgerStore, LedgerTx, StoreResult};

/// Runs units of work against a store
#[derive(Debug, Clone)]
pub struct TransactionCoordinator<S> {
    store: S,
}

impl<S: LedgerStore> TransactionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `work` inside one transaction.
    ///
    /// Commits when `work` succeeds. Otherwise rolls back and returns the
    /// error from `work`; if the rollback fails too, both are reported.
    pub async fn exec_tx<T, F>(&self, work: F) -> TransferOutcome<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, TransferOutcome<T>> + Send,
    {
        let mut tx = self.store.begin().await?;
        let outcome = work(&mut tx).await;
        finish(tx, outcome).await
    }

    /// Like [`exec_tx`](Self::exec_tx), but `begin` and `work` must finish
    /// within `timeout`.
    ///
    /// On expiry the transaction is dropped uncommitted and
    /// `InfrastructureError::Timeout` is returned. The deadline never covers
    /// the commit: once COMMIT is sent its outcome is reported as is.
    pub async fn exec_tx_with_timeout<T, F>(&self, timeout: Duration, work: F) -> TransferOutcome<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> BoxFuture<'t, TransferOutcome<T>> + Send,
    {
        let deadline = Instant::now() + timeout;

        let mut tx = match tokio::time::timeout_at(deadline, self.store.begin()).await {
            Ok(tx) => tx?,
            Err(_) => return Err(InfrastructureError::Timeout(timeout).into()),
        };

        let timed = tokio::time::timeout_at(deadline, work(&mut tx)).await;
        let outcome = match timed {
            Ok(outcome) => outcome,
            Err(_) => {
                // An explicit ROLLBACK would queue behind the abandoned
                // statement; dropping the transaction rolls it back instead.
                drop(tx);
                return Err(InfrastructureError::Timeout(timeout).into());
            }
        };

        finish(tx, outcome).await
    }
}

/// Commit on success, roll back on error
async fn finish<Tx: LedgerTx, T>(tx: Tx, outcome: TransferOutcome<T>) -> TransferOutcome<T> {
    match outcome {
        Ok(value) => {
            if let Err(commit_err) = tx.commit().await {
                tracing::error!(error = %commit_err, "Commit failed, outcome unknown");
                return Err(TransferError::commit_failed(commit_err));
            }
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(
                    error = %err,
                    rollback_error = %rollback_err,
                    "Rollback failed after transaction error"
                );
                return Err(TransferError::rollback_failed(err, rollback_err));
            }
            Err(err)
        }
    }
}

/// Both transfer endpoints as read under lock.
///
/// `None` means the row does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedAccounts {
    pub from: Option<Account>,
    pub to: Option<Account>,
}

/// Order two account ids the way every transaction must lock them
pub fn canonical_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Lock both endpoints with lock-for-update reads in canonical order.
///
/// A self-transfer locks its single row once.
pub async fn lock_accounts<Tx: LedgerTx>(
    tx: &mut Tx,
    from_account_id: AccountId,
    to_account_id: AccountId,
) -> StoreResult<LockedAccounts> {
    if from_account_id == to_account_id {
        let account = tx.get_account_for_update(from_account_id).await?;
        return Ok(LockedAccounts {
            from: account.clone(),
            to: account,
        });
    }

    let (first, second) = canonical_order(from_account_id, to_account_id);
    let first_account = tx.get_account_for_update(first).await?;
    let second_account = tx.get_account_for_update(second).await?;

    let (from, to) = if first == from_account_id {
        (first_account, second_account)
    } else {
        (second_account, first_account)
    };

    Ok(LockedAccounts { from, to })
}
