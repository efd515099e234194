//! PostgreSQL backend
//!
//! Row locks come from `SELECT ... FOR NO KEY UPDATE`; the two balance changes
//! of a transfer are applied by one `UPDATE` statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Account, AccountId, Currency, LedgerEntry, NewAccount, Transfer};
use crate::error::InfrastructureError;

use super::{LedgerStore, LedgerTx, NewEntry, NewTransfer, StoreResult};

/// Raw `accounts` row
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    owner: String,
    balance: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = InfrastructureError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let currency: Currency = row
            .currency
            .parse()
            .map_err(|e| InfrastructureError::Decode(format!("account {}: {}", row.id, e)))?;

        Ok(Account {
            id: row.id,
            owner: row.owner,
            balance: row.balance,
            currency,
            created_at: row.created_at,
        })
    }
}

fn into_entry((id, account_id, amount, created_at): (i64, i64, Decimal, DateTime<Utc>)) -> LedgerEntry {
    LedgerEntry {
        id,
        account_id,
        amount,
        created_at,
    }
}

fn into_transfer(
    (id, from_account_id, to_account_id, amount, created_at): (i64, i64, i64, Decimal, DateTime<Utc>),
) -> Transfer {
    Transfer {
        id,
        from_account_id,
        to_account_id,
        amount,
        created_at,
    }
}

/// Ledger store over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let row: AccountRow = sqlx::query_as(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&account.owner)
        .bind(account.balance)
        .bind(account.currency.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn list_entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, (i64, i64, Decimal, DateTime<Utc>)>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_entry).collect())
    }

    async fn list_transfers(&self, account_id: AccountId) -> StoreResult<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, Decimal, DateTime<Utc>)>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_transfer).collect())
    }
}

/// Open PostgreSQL transaction.
///
/// Dropping it without `commit` makes sqlx roll the transaction back, which
/// also releases the row locks.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn fetch_account(&mut self, id: AccountId, for_update: bool) -> StoreResult<Option<Account>> {
        let sql = if for_update {
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            LIMIT 1
            FOR NO KEY UPDATE
            "#
        } else {
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            LIMIT 1
            "#
        };

        let row: Option<AccountRow> = sqlx::query_as(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn get_account_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.fetch_account(id, true).await
    }

    async fn get_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.fetch_account(id, false).await
    }

    async fn create_transfer(&mut self, transfer: NewTransfer) -> StoreResult<Transfer> {
        let row = sqlx::query_as::<_, (i64, i64, i64, Decimal, DateTime<Utc>)>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(transfer.from_account_id)
        .bind(transfer.to_account_id)
        .bind(transfer.amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(into_transfer(row))
    }

    async fn create_entry(&mut self, entry: NewEntry) -> StoreResult<LedgerEntry> {
        let row = sqlx::query_as::<_, (i64, i64, Decimal, DateTime<Utc>)>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(entry.account_id)
        .bind(entry.amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(into_entry(row))
    }

    async fn update_transfer_balances(
        &mut self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
    ) -> StoreResult<u64> {
        // Both CASE arms apply when from = to, so a self-transfer nets to zero.
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance
                - CASE WHEN id = $1 THEN $2::numeric ELSE 0 END
                + CASE WHEN id = $3 THEN $2::numeric ELSE 0 END
            WHERE id IN ($1, $3)
            "#,
        )
        .bind(from_account_id)
        .bind(amount)
        .bind(to_account_id)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
