//! Transfer inputs and lifecycle stages

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{AccountId, Amount};

/// Request to move `amount` from one account to another.
///
/// Currency match and caller authorization are checked before a transfer
/// reaches the service; only sufficiency of funds is enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
}

impl TransferParams {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Amount) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// The same transfer in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            from_account_id: self.to_account_id,
            to_account_id: self.from_account_id,
            amount: self.amount,
        }
    }

    pub fn is_self_transfer(&self) -> bool {
        self.from_account_id == self.to_account_id
    }
}

/// Progress of one transfer attempt.
///
/// `Committed` and `RolledBack` are terminal; any intermediate stage may end
/// in `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStage {
    Started,
    AccountsLocked,
    FundsVerified,
    RecordsWritten,
    BalancesUpdated,
    Committed,
    RolledBack,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::Started => "started",
            TransferStage::AccountsLocked => "accounts_locked",
            TransferStage::FundsVerified => "funds_verified",
            TransferStage::RecordsWritten => "records_written",
            TransferStage::BalancesUpdated => "balances_updated",
            TransferStage::Committed => "committed",
            TransferStage::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
