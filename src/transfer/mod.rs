//! Transfer module
//!
//! The transfer core: a coordinator that owns transaction scope and lock
//! order, and the service that runs the transfer steps inside it.

pub mod coordinator;
mod params;
mod service;

pub use coordinator::{canonical_order, lock_accounts, LockedAccounts, TransactionCoordinator};
pub use params::{TransferParams, TransferStage};
pub use service::{TransferService, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
