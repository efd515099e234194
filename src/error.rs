//! Error handling module
//!
//! Closed set of transfer failures with structured context.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::AccountId;

/// Result type for ledger operations
pub type TransferOutcome<T> = Result<T, TransferError>;

/// PostgreSQL SQLSTATE for serialization failures
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL SQLSTATE for detected deadlocks
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";

/// Errors returned by a transfer attempt.
///
/// Every variant is returned only after the unit of work has been rolled
/// back, so none of them leave partial writes behind.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Either endpoint of the transfer does not exist
    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: AccountId },

    /// The debited account cannot cover the amount at lock time
    #[error("Insufficient funds in account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        requested: Decimal,
        available: Decimal,
    },

    /// The combined balance update touched an unexpected number of rows
    #[error("Consistency violation: balance update affected {affected} rows, expected {expected}")]
    ConsistencyViolation { expected: u64, affected: u64 },

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

/// Storage-level failures. Nothing is committed when one of these occurs.
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid stored data: {0}")]
    Decode(String),

    /// COMMIT was sent but did not confirm; the transfer may have been applied
    #[error("Commit outcome unknown: {0}")]
    CommitFailed(#[source] Box<InfrastructureError>),

    /// Rolling back after `cause` failed as well
    #[error("Transaction failed: {cause}; rollback failed: {rollback}")]
    RollbackFailed {
        #[source]
        cause: Box<TransferError>,
        rollback: Box<InfrastructureError>,
    },
}

impl From<sqlx::Error> for TransferError {
    fn from(err: sqlx::Error) -> Self {
        TransferError::Infrastructure(InfrastructureError::Database(err))
    }
}

impl TransferError {
    pub fn account_not_found(account_id: AccountId) -> Self {
        Self::AccountNotFound { account_id }
    }

    pub fn insufficient_funds(account_id: AccountId, requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            account_id,
            requested,
            available,
        }
    }

    /// Wrap an error whose rollback also failed
    pub fn rollback_failed(cause: TransferError, rollback: InfrastructureError) -> Self {
        Self::Infrastructure(InfrastructureError::RollbackFailed {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        })
    }

    /// Wrap a failed commit, whose effect cannot be known
    pub fn commit_failed(err: InfrastructureError) -> Self {
        Self::Infrastructure(InfrastructureError::CommitFailed(Box::new(err)))
    }

    /// Rejections caused by the request itself (not retried)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound { .. } | Self::InsufficientFunds { .. }
        )
    }

    /// Transient failures; the whole attempt may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Infrastructure(infra) => infra.is_transient(),
            _ => false,
        }
    }

    /// Lock conflicts reported by the database that resolve on retry
    pub fn is_lock_conflict(&self) -> bool {
        match self {
            Self::Infrastructure(infra) => infra.is_lock_conflict(),
            _ => false,
        }
    }

    /// Stable snake_case code for callers that map errors to responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound { .. } => "account_not_found",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::ConsistencyViolation { .. } => "consistency_violation",
            Self::Infrastructure(InfrastructureError::Timeout(_)) => "timeout",
            Self::Infrastructure(InfrastructureError::RollbackFailed { .. }) => "rollback_failed",
            Self::Infrastructure(InfrastructureError::CommitFailed(_)) => "commit_failed",
            Self::Infrastructure(_) => "infrastructure_error",
        }
    }
}

impl InfrastructureError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(_) | Self::Timeout(_) | Self::RollbackFailed { .. } => true,
            // A retry after an unconfirmed commit could apply the transfer twice.
            Self::Constraint(_) | Self::Decode(_) | Self::CommitFailed(_) => false,
        }
    }

    pub fn is_lock_conflict(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => matches!(
                db_err.code().as_deref(),
                Some(SQLSTATE_SERIALIZATION_FAILURE) | Some(SQLSTATE_DEADLOCK_DETECTED)
            ),
            _ => false,
        }
    }
}
