//! Common test utilities
//!
//! Seeding helpers, ledger assertions and the transfer scenarios shared by
//! the in-memory and PostgreSQL suites.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use cedar_ledger::domain::NewAccount;
use cedar_ledger::{
    Account, AccountId, Amount, Currency, InfrastructureError, LedgerStore, LedgerTx,
    TransferError, TransferParams, TransferService,
};

pub mod faulty;

/// Upper bound for any concurrent scenario; hitting it means a deadlock
pub const SCENARIO_DEADLINE: Duration = Duration::from_secs(20);

pub fn amount(value: i64) -> Amount {
    Amount::from_integer(value).unwrap()
}

pub async fn seed_accounts<S: LedgerStore>(store: &S, balances: &[Decimal]) -> Vec<Account> {
    let mut accounts = Vec::with_capacity(balances.len());
    for (i, balance) in balances.iter().enumerate() {
        let account = store
            .create_account(NewAccount::new(format!("test-owner-{i}"), *balance, Currency::USD))
            .await
            .expect("Failed to seed account");
        accounts.push(account);
    }
    accounts
}

pub async fn balance_of<S: LedgerStore>(store: &S, id: AccountId) -> Decimal {
    store
        .get_account(id)
        .await
        .expect("Failed to read account")
        .expect("Account disappeared")
        .balance
}

pub async fn entry_sum<S: LedgerStore>(store: &S, id: AccountId) -> Decimal {
    store
        .list_entries(id)
        .await
        .expect("Failed to list entries")
        .iter()
        .map(|entry| entry.amount)
        .sum()
}

/// Balance moved by exactly the sum of the account's entries
pub async fn assert_ledger_matches<S: LedgerStore>(store: &S, account: &Account) {
    let balance = balance_of(store, account.id).await;
    let entries = entry_sum(store, account.id).await;
    assert_eq!(
        balance - account.balance,
        entries,
        "ledger entries of account {} do not explain its balance",
        account.id
    );
}

/// Nothing was written for any of `accounts` since they were seeded
pub async fn assert_untouched<S: LedgerStore>(store: &S, accounts: &[Account]) {
    for account in accounts {
        assert_eq!(balance_of(store, account.id).await, account.balance);
        assert!(store.list_entries(account.id).await.unwrap().is_empty());
        assert!(store.list_transfers(account.id).await.unwrap().is_empty());
    }
}

// =========================================================================
// Scenarios
// =========================================================================

/// A=100, B=50, five concurrent transfers of 10 from A to B
pub async fn concurrent_same_direction<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let accounts = seed_accounts(&store, &[dec!(100), dec!(50)]).await;
    let (a, b) = (accounts[0].clone(), accounts[1].clone());
    let service = Arc::new(TransferService::new(store.clone()));

    let n = 5;
    let mut handles = Vec::new();
    for _ in 0..n {
        let service = Arc::clone(&service);
        let params = TransferParams::new(a.id, b.id, amount(10));
        handles.push(tokio::spawn(async move { service.execute(params).await }));
    }

    let results = tokio::time::timeout(SCENARIO_DEADLINE, futures::future::join_all(handles))
        .await
        .expect("transfers did not finish");

    let mut seen_steps = HashSet::new();
    for joined in results {
        let result = joined.unwrap().expect("transfer failed");

        assert_eq!(result.transfer.from_account_id, a.id);
        assert_eq!(result.transfer.to_account_id, b.id);
        assert_eq!(result.transfer.amount, dec!(10));
        assert_eq!(result.from_entry.account_id, a.id);
        assert_eq!(result.from_entry.amount, dec!(-10));
        assert_eq!(result.to_entry.account_id, b.id);
        assert_eq!(result.to_entry.amount, dec!(10));

        // Each result is a consistent snapshot: what left A arrived at B.
        let left_a = a.balance - result.from_account.balance;
        let reached_b = result.to_account.balance - b.balance;
        assert_eq!(left_a, reached_b);
        assert!(left_a > Decimal::ZERO);

        let step = left_a / dec!(10);
        assert!(step >= Decimal::ONE && step <= Decimal::from(n));
        assert!(seen_steps.insert(step), "two transfers observed the same post-balance");
    }

    assert_eq!(balance_of(&store, a.id).await, dec!(50));
    assert_eq!(balance_of(&store, b.id).await, dec!(100));

    assert_eq!(store.list_transfers(a.id).await.unwrap().len(), n);
    let entries_a = store.list_entries(a.id).await.unwrap();
    let entries_b = store.list_entries(b.id).await.unwrap();
    assert_eq!(entries_a.len(), n);
    assert_eq!(entries_b.len(), n);
    assert!(entries_a.iter().all(|e| e.amount == dec!(-10)));
    assert!(entries_b.iter().all(|e| e.amount == dec!(10)));

    assert_eq!(entry_sum(&store, a.id).await + entry_sum(&store, b.id).await, Decimal::ZERO);
    assert_ledger_matches(&store, &a).await;
    assert_ledger_matches(&store, &b).await;
}

/// Opposite-direction transfers between the same pair never deadlock
pub async fn opposite_directions<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let accounts = seed_accounts(&store, &[dec!(100), dec!(100)]).await;
    let (a, b) = (accounts[0].clone(), accounts[1].clone());
    let service = Arc::new(TransferService::new(store.clone()));

    let n = 20;
    let mut handles = Vec::new();
    for i in 0..n {
        let service = Arc::clone(&service);
        let params = TransferParams::new(a.id, b.id, amount(10));
        let params = if i % 2 == 0 { params } else { params.reversed() };
        handles.push(tokio::spawn(async move { service.execute(params).await }));
    }

    let results = tokio::time::timeout(SCENARIO_DEADLINE, futures::future::join_all(handles))
        .await
        .expect("opposite-direction transfers deadlocked");

    for joined in results {
        joined.unwrap().expect("transfer failed");
    }

    let balance_a = balance_of(&store, a.id).await;
    let balance_b = balance_of(&store, b.id).await;
    assert_eq!(balance_a + balance_b, dec!(200));
    assert_eq!(balance_a, dec!(100));
    assert_eq!(store.list_transfers(a.id).await.unwrap().len(), n);
    assert_ledger_matches(&store, &a).await;
    assert_ledger_matches(&store, &b).await;
}

/// A=5, transfer 10 to B
pub async fn insufficient_funds<S: LedgerStore + Clone>(store: S) {
    let accounts = seed_accounts(&store, &[dec!(5), dec!(20)]).await;
    let service = TransferService::new(store.clone());

    let err = service
        .execute(TransferParams::new(accounts[0].id, accounts[1].id, amount(10)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::InsufficientFunds { account_id, .. } if account_id == accounts[0].id
    ));
    assert_untouched(&store, &accounts).await;
}

/// Transfer from an account id that was never created
pub async fn missing_account<S: LedgerStore + Clone>(store: S) {
    let accounts = seed_accounts(&store, &[dec!(100)]).await;
    let service = TransferService::new(store.clone());
    let ghost = accounts[0].id + 1_000_000;

    let err = service
        .execute(TransferParams::new(ghost, accounts[0].id, amount(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AccountNotFound { account_id } if account_id == ghost));

    let err = service
        .execute(TransferParams::new(accounts[0].id, ghost, amount(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AccountNotFound { account_id } if account_id == ghost));

    assert_untouched(&store, &accounts).await;
}

/// Many concurrent draws on one account: some are rejected, none overdraw
pub async fn never_negative<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let accounts = seed_accounts(&store, &[dec!(35), dec!(0), dec!(0)]).await;
    let service = Arc::new(TransferService::new(store.clone()));

    let mut handles = Vec::new();
    for i in 0..12 {
        let service = Arc::clone(&service);
        let to = accounts[1 + i % 2].id;
        let params = TransferParams::new(accounts[0].id, to, amount(5));
        handles.push(tokio::spawn(async move { service.execute(params).await }));
    }

    let results = tokio::time::timeout(SCENARIO_DEADLINE, futures::future::join_all(handles))
        .await
        .expect("transfers did not finish");

    let mut committed = 0;
    for joined in results {
        match joined.unwrap() {
            Ok(result) => {
                assert!(result.from_account.balance >= Decimal::ZERO);
                committed += 1;
            }
            Err(TransferError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(committed, 7);
    assert_eq!(balance_of(&store, accounts[0].id).await, Decimal::ZERO);
    let total: Decimal = [
        balance_of(&store, accounts[0].id).await,
        balance_of(&store, accounts[1].id).await,
        balance_of(&store, accounts[2].id).await,
    ]
    .iter()
    .sum();
    assert_eq!(total, dec!(35));
    for account in &accounts {
        assert_ledger_matches(&store, account).await;
    }
}

/// K transfers over K disjoint pairs all commit
pub async fn disjoint_pairs<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let k = 8;
    let balances = vec![dec!(10); k * 2];
    let accounts = seed_accounts(&store, &balances).await;
    let service = Arc::new(TransferService::new(store.clone()));

    let mut handles = Vec::new();
    for pair in accounts.chunks(2) {
        let service = Arc::clone(&service);
        let params = TransferParams::new(pair[0].id, pair[1].id, amount(10));
        handles.push(tokio::spawn(async move { service.execute(params).await }));
    }

    let results = tokio::time::timeout(SCENARIO_DEADLINE, futures::future::join_all(handles))
        .await
        .expect("transfers did not finish");
    for joined in results {
        joined.unwrap().expect("transfer failed");
    }

    for pair in accounts.chunks(2) {
        assert_eq!(balance_of(&store, pair[0].id).await, Decimal::ZERO);
        assert_eq!(balance_of(&store, pair[1].id).await, dec!(20));
    }
}

/// A row lock held elsewhere: disjoint transfers proceed, the blocked one
/// times out without persisting anything and without leaking its locks
pub async fn held_lock_times_out<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let accounts = seed_accounts(&store, &[dec!(100), dec!(100), dec!(100), dec!(100)]).await;
    let (a, b, c, d) = (
        accounts[0].clone(),
        accounts[1].clone(),
        accounts[2].clone(),
        accounts[3].clone(),
    );
    let service = TransferService::new(store.clone())
        .with_timeout(Duration::from_millis(300))
        .with_max_retries(0);

    let mut holder = store.begin().await.unwrap();
    holder.get_account_for_update(a.id).await.unwrap().unwrap();

    let result = service
        .execute(TransferParams::new(c.id, d.id, amount(25)))
        .await
        .expect("disjoint transfer should not wait on the held lock");
    assert_eq!(result.from_account.balance, dec!(75));

    let err = service
        .execute(TransferParams::new(a.id, b.id, amount(10)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Infrastructure(InfrastructureError::Timeout(_))
    ));
    assert_eq!(err.error_code(), "timeout");
    assert_untouched(&store, &[a.clone(), b.clone()]).await;

    holder.rollback().await.unwrap();

    let result = service
        .execute(TransferParams::new(b.id, a.id, amount(10)))
        .await
        .expect("locks of the timed out attempt were not released");
    assert_eq!(result.to_account.balance, dec!(110));
    assert_eq!(store.list_transfers(a.id).await.unwrap().len(), 1);
}
