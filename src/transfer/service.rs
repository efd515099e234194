//! Transfer Service
//!
//! Moves funds between two accounts as one unit of work: lock both rows,
//! verify funds, write the transfer and its two ledger entries, apply both
//! balance changes, then read the accounts back for the result.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::domain::TransferResult;
use crate::error::{TransferError, TransferOutcome};
use crate::store::{LedgerStore, LedgerTx, NewEntry, NewTransfer};

use super::coordinator::{lock_accounts, TransactionCoordinator};
use super::params::{TransferParams, TransferStage};

/// Default deadline for one transfer attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retries after a database lock conflict
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Executes transfers against a ledger store
#[derive(Debug, Clone)]
pub struct TransferService<S> {
    coordinator: TransactionCoordinator<S>,
    timeout: Duration,
    max_retries: u32,
}

impl<S: LedgerStore> TransferService<S> {
    pub fn new(store: S) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Deadline applied to each attempt by [`execute`](Self::execute)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries after serialization failures or detected deadlocks
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a transfer with the service's default deadline
    pub async fn execute(&self, params: TransferParams) -> TransferOutcome<TransferResult> {
        self.execute_with_timeout(params, self.timeout).await
    }

    /// Execute a transfer, bounding each attempt by `timeout`.
    ///
    /// An attempt that hits the deadline before committing is rolled back
    /// and returns `InfrastructureError::Timeout`; its locks are released.
    /// The commit itself is not bounded.
    pub async fn execute_with_timeout(
        &self,
        params: TransferParams,
        timeout: Duration,
    ) -> TransferOutcome<TransferResult> {
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(params, timeout).await {
                Err(err) if err.is_lock_conflict() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        from_account_id = params.from_account_id,
                        to_account_id = params.to_account_id,
                        error = %err,
                        "Lock conflict, retrying (attempt {}/{})",
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn attempt(
        &self,
        params: TransferParams,
        timeout: Duration,
    ) -> TransferOutcome<TransferResult> {
        let outcome = self
            .coordinator
            .exec_tx_with_timeout(timeout, move |tx| Box::pin(run_transfer(tx, params)))
            .await;

        match &outcome {
            Ok(result) => {
                info!(
                    transfer_id = result.transfer.id,
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    amount = %params.amount,
                    stage = %TransferStage::Committed,
                    "Transfer committed"
                );
            }
            Err(err @ TransferError::ConsistencyViolation { .. }) => {
                error!(
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    amount = %params.amount,
                    stage = %TransferStage::RolledBack,
                    error = %err,
                    "Transfer aborted on inconsistent balance update"
                );
            }
            Err(err) if err.is_client_error() => {
                warn!(
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    amount = %params.amount,
                    stage = %TransferStage::RolledBack,
                    error = %err,
                    "Transfer rejected"
                );
            }
            Err(err) => {
                warn!(
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    amount = %params.amount,
                    stage = %TransferStage::RolledBack,
                    error = %err,
                    "Transfer failed"
                );
            }
        }

        outcome
    }
}

fn log_stage(params: &TransferParams, stage: TransferStage) {
    debug!(
        from_account_id = params.from_account_id,
        to_account_id = params.to_account_id,
        stage = %stage,
        "Transfer stage reached"
    );
}

/// The body of one transfer attempt, run inside an open transaction
async fn run_transfer<Tx: LedgerTx>(
    tx: &mut Tx,
    params: TransferParams,
) -> TransferOutcome<TransferResult> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;
    log_stage(&params, TransferStage::Started);

    let locked = lock_accounts(tx, from_account_id, to_account_id).await?;
    log_stage(&params, TransferStage::AccountsLocked);

    let from_account = locked
        .from
        .ok_or_else(|| TransferError::account_not_found(from_account_id))?;
    if !amount.is_covered_by(from_account.balance) {
        return Err(TransferError::insufficient_funds(
            from_account_id,
            amount.value(),
            from_account.balance,
        ));
    }
    if locked.to.is_none() {
        return Err(TransferError::account_not_found(to_account_id));
    }
    log_stage(&params, TransferStage::FundsVerified);

    let transfer = tx
        .create_transfer(NewTransfer {
            from_account_id,
            to_account_id,
            amount: amount.value(),
        })
        .await?;
    let from_entry = tx
        .create_entry(NewEntry {
            account_id: from_account_id,
            amount: amount.as_debit(),
        })
        .await?;
    let to_entry = tx
        .create_entry(NewEntry {
            account_id: to_account_id,
            amount: amount.as_credit(),
        })
        .await?;
    log_stage(&params, TransferStage::RecordsWritten);

    let expected: u64 = if params.is_self_transfer() { 1 } else { 2 };
    let affected = tx
        .update_transfer_balances(from_account_id, to_account_id, amount.value())
        .await?;
    if affected != expected {
        return Err(TransferError::ConsistencyViolation { expected, affected });
    }
    log_stage(&params, TransferStage::BalancesUpdated);

    let from_account = tx
        .get_account(from_account_id)
        .await?
        .ok_or_else(|| TransferError::account_not_found(from_account_id))?;
    let to_account = tx
        .get_account(to_account_id)
        .await?
        .ok_or_else(|| TransferError::account_not_found(to_account_id))?;

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}
