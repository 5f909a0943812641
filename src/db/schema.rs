use sqlx::PgPool;

/// Create the ledger tables if they do not exist yet.
///
/// Idempotent; safe to call on every start and from tests.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing ledger schema...");

    // Concurrent CREATE ... IF NOT EXISTS can still collide on the catalog;
    // serialize initializers on an advisory lock held until commit.
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    for (name, ddl) in [
        ("accounts", CREATE_ACCOUNTS_TABLE),
        ("entries", CREATE_ENTRIES_TABLE),
        ("transfers", CREATE_TRANSFERS_TABLE),
        ("indexes", CREATE_INDEXES),
    ] {
        sqlx::raw_sql(ddl).execute(&mut *tx).await.inspect_err(|e| {
            tracing::error!(step = name, error = %e, "Failed to initialize schema");
        })?;
    }

    tx.commit().await?;
    tracing::info!("Ledger schema initialized successfully");
    Ok(())
}

const SCHEMA_LOCK_KEY: i64 = 0x1ed6e5;

// Balances are BIGINT minor units. No CHECK (balance >= 0): the floor is
// enforced by BalancePolicy.
const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    owner       TEXT        NOT NULL,
    balance     BIGINT      NOT NULL,
    currency    TEXT        NOT NULL CHECK (currency IN ('INR', 'USD', 'EUR')),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT      NOT NULL REFERENCES accounts (id),
    amount      BIGINT      NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id               BIGSERIAL PRIMARY KEY,
    from_account_id  BIGINT      NOT NULL REFERENCES accounts (id),
    to_account_id    BIGINT      NOT NULL REFERENCES accounts (id),
    amount           BIGINT      NOT NULL CHECK (amount > 0),
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS accounts_owner_idx ON accounts (owner);
CREATE INDEX IF NOT EXISTS entries_account_id_idx ON entries (account_id);
CREATE INDEX IF NOT EXISTS transfers_from_account_id_idx ON transfers (from_account_id);
CREATE INDEX IF NOT EXISTS transfers_to_account_id_idx ON transfers (to_account_id);
"#;
