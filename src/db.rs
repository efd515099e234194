//! Database module
//!
//! Pool construction, connectivity checks and schema setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::Config;

/// Idempotent DDL for the ledger tables
pub const SCHEMA_SQL: &str = include_str!("../migrations/0001_ledger.sql");

/// Tables the transfer engine depends on
const REQUIRED_TABLES: [&str; 3] = ["accounts", "entries", "transfers"];

/// Open a connection pool sized from configuration
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Create the ledger tables and indexes if they are missing
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Multi-statement script, so it goes through the simple query protocol.
    pool.execute(SCHEMA_SQL).await?;
    tracing::info!("Ledger schema applied");
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
