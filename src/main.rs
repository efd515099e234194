//! cedar-ledger - single transfer runner
//!
//! Usage: cedar_ledger <from_account_id> <to_account_id> <amount>
//!
//! Executes one transfer against the configured database and prints the
//! resulting snapshot as JSON.

use anyhow::Context;

use cedar_ledger::{db, telemetry, Amount, Config, PgLedgerStore, TransferParams, TransferService};

fn parse_args() -> anyhow::Result<TransferParams> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [from, to, amount] = args.as_slice() else {
        anyhow::bail!("usage: cedar_ledger <from_account_id> <to_account_id> <amount>");
    };

    let from = from.parse::<i64>().context("invalid from_account_id")?;
    let to = to.parse::<i64>().context("invalid to_account_id")?;
    let amount: Amount = amount.parse().context("invalid amount")?;

    Ok(TransferParams::new(from, to, amount))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format);

    let params = parse_args()?;

    tracing::info!("Connecting to database...");
    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;
    tracing::info!("Database connection verified");

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    let service = TransferService::new(PgLedgerStore::new(pool.clone()))
        .with_timeout(config.transfer_timeout)
        .with_max_retries(config.transfer_max_retries);

    let outcome = service.execute(params).await;
    pool.close().await;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!(error_code = err.error_code(), "Transfer failed: {}", err);
            Err(err.into())
        }
    }
}
