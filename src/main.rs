//! bank_ledger - ledger core runner
//!
//! Loads `config/<env>.yaml`, sets up logging, connects to PostgreSQL and
//! bootstraps the schema. With `--demo` it also opens two accounts and runs
//! one same-currency and one cross-currency transfer, printing the results.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use bank_ledger::config::AppConfig;
use bank_ledger::db::{Database, SqlStore, StoreOptions, schema};
use bank_ledger::{Currency, LedgerService, TransferRequest};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn use_demo_mode() -> bool {
    std::env::args().any(|a| a == "--demo")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = bank_ledger::logging::init_logging(&app_config);

    tracing::info!(
        git_hash = env!("GIT_HASH"),
        balance_policy = ?app_config.ledger.balance_policy,
        "Starting bank_ledger in {} mode",
        env
    );

    let db = Database::connect(&app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("Database health check failed")?;
    schema::init_schema(db.pool())
        .await
        .context("Failed to initialize schema")?;

    let store = Arc::new(SqlStore::new(
        db.into_pool(),
        StoreOptions {
            balance_policy: app_config.ledger.balance_policy,
            lock_timeout_ms: app_config.database.lock_timeout_ms,
        },
    ));
    let service = LedgerService::new(store);

    if use_demo_mode() {
        run_demo(&service).await?;
    }

    tracing::info!("bank_ledger ready");
    Ok(())
}

async fn run_demo(service: &LedgerService<SqlStore>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let a = service.open_account("demo_a", Currency::INR, 1000).await?;
    let b = service.open_account("demo_b", Currency::INR, 500).await?;
    let c = service.open_account("demo_b", Currency::USD, 0).await?;

    let same = service
        .transfer(
            "demo_a",
            TransferRequest {
                from_account_id: a.id,
                to_account_id: b.id,
                amount: 150,
                currency: Some(Currency::INR),
                to_owner: None,
            },
            &cancel,
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&same)?);

    let fx = service
        .transfer(
            "demo_a",
            TransferRequest {
                from_account_id: a.id,
                to_account_id: c.id,
                amount: 830,
                currency: None,
                to_owner: Some("demo_b".to_string()),
            },
            &cancel,
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&fx)?);

    Ok(())
}
