//! Entity store: typed statements over `accounts`, `entries` and `transfers`.
//!
//! `Queries<C>` wraps anything that dereferences to a `PgConnection`, so the
//! exact same statements run on a pooled connection or inside an open
//! transaction.

use std::ops::DerefMut;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres, Transaction};

use super::models::{
    Account, CreateAccountParams, Entry, ListAccountsParams, ListTransfersParams, Transfer,
    TransferHistoryItem,
};
use crate::error::{LedgerError, Result};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";

/// Queries bound to an open transaction
pub type TxQueries = Queries<Transaction<'static, Postgres>>;

/// Queries bound to a connection checked out of the pool
pub type PoolQueries = Queries<PoolConnection<Postgres>>;

pub struct Queries<C> {
    conn: C,
}

fn check_page(limit: i64, offset: i64) -> Result<()> {
    if limit < 0 || offset < 0 {
        return Err(LedgerError::InvalidPagination(format!(
            "limit={} offset={}",
            limit, offset
        )));
    }
    Ok(())
}

impl<C> Queries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Raw connection, for statements the store does not model
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn create_account(&mut self, arg: &CreateAccountParams) -> Result<Account> {
        let sql = format!(
            "INSERT INTO accounts (owner, balance, currency) VALUES ($1, $2, $3) RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(&arg.owner)
            .bind(arg.balance)
            .bind(arg.currency.as_str())
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(account)
    }

    pub async fn get_account(&mut self, id: i64) -> Result<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1 LIMIT 1", ACCOUNT_COLUMNS);
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id,
            })
    }

    /// Read an account and hold its row lock until the transaction ends.
    ///
    /// `FOR NO KEY UPDATE` conflicts with other writers but not with the
    /// `FOR KEY SHARE` locks taken by foreign-key checks on entries/transfers.
    pub async fn get_account_for_update(&mut self, id: i64) -> Result<Account> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 LIMIT 1 FOR NO KEY UPDATE",
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id,
            })
    }

    /// Accounts ordered by id, optionally restricted to one owner.
    pub async fn list_accounts(&mut self, arg: &ListAccountsParams) -> Result<Vec<Account>> {
        check_page(arg.limit, arg.offset)?;
        let sql = format!(
            "SELECT {} FROM accounts
             WHERE ($1::TEXT IS NULL OR owner = $1)
             ORDER BY id
             LIMIT $2 OFFSET $3",
            ACCOUNT_COLUMNS
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(arg.owner.as_deref())
            .bind(arg.limit)
            .bind(arg.offset)
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(accounts)
    }

    /// Overwrite the balance. Not used by transfers, which only apply deltas.
    pub async fn update_account(&mut self, id: i64, balance: i64) -> Result<Account> {
        let sql = format!(
            "UPDATE accounts SET balance = $2 WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(balance)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id,
            })
    }

    /// Atomic delta increment: a single statement, no read step.
    pub async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account> {
        let sql = format!(
            "UPDATE accounts SET balance = balance + $2 WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(delta)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id,
            })
    }

    pub async fn delete_account(&mut self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound {
                entity: "account",
                id,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Entries
    // ========================================================================

    pub async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry> {
        let sql = format!(
            "INSERT INTO entries (account_id, amount) VALUES ($1, $2) RETURNING {}",
            ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<_, Entry>(&sql)
            .bind(account_id)
            .bind(amount)
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(entry)
    }

    pub async fn get_entry(&mut self, id: i64) -> Result<Entry> {
        let sql = format!("SELECT {} FROM entries WHERE id = $1 LIMIT 1", ENTRY_COLUMNS);
        sqlx::query_as::<_, Entry>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or(LedgerError::NotFound { entity: "entry", id })
    }

    pub async fn list_entries(
        &mut self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>> {
        check_page(limit, offset)?;
        let sql = format!(
            "SELECT {} FROM entries WHERE account_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, Entry>(&sql)
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(entries)
    }

    /// Sum of every entry recorded against the account (0 when none).
    pub async fn sum_entries(&mut self, account_id: i64) -> Result<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM entries WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(sum)
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    pub async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer> {
        let sql = format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount)
             VALUES ($1, $2, $3) RETURNING {}",
            TRANSFER_COLUMNS
        );
        let transfer = sqlx::query_as::<_, Transfer>(&sql)
            .bind(from_account_id)
            .bind(to_account_id)
            .bind(amount)
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(transfer)
    }

    pub async fn get_transfer(&mut self, id: i64) -> Result<Transfer> {
        let sql = format!("SELECT {} FROM transfers WHERE id = $1 LIMIT 1", TRANSFER_COLUMNS);
        sqlx::query_as::<_, Transfer>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or(LedgerError::NotFound {
                entity: "transfer",
                id,
            })
    }

    /// Transfers leaving `from_account_id` or arriving at `to_account_id`.
    pub async fn list_transfers(&mut self, arg: &ListTransfersParams) -> Result<Vec<Transfer>> {
        check_page(arg.limit, arg.offset)?;
        let sql = format!(
            "SELECT {} FROM transfers
             WHERE from_account_id = $1 OR to_account_id = $2
             ORDER BY id
             LIMIT $3 OFFSET $4",
            TRANSFER_COLUMNS
        );
        let transfers = sqlx::query_as::<_, Transfer>(&sql)
            .bind(arg.from_account_id)
            .bind(arg.to_account_id)
            .bind(arg.limit)
            .bind(arg.offset)
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(transfers)
    }

    /// Transfer history touching any account of `owner`, newest first.
    pub async fn list_transfers_by_owner(
        &mut self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransferHistoryItem>> {
        check_page(limit, offset)?;
        let items = sqlx::query_as::<_, TransferHistoryItem>(
            r#"
            SELECT t.id, t.from_account_id, t.to_account_id, t.amount,
                   fa.currency AS from_currency, ta.currency AS to_currency,
                   t.created_at
            FROM transfers t
            JOIN accounts fa ON fa.id = t.from_account_id
            JOIN accounts ta ON ta.id = t.to_account_id
            WHERE fa.owner = $1 OR ta.owner = $1
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(items)
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Bound how long this transaction waits for a row lock.
    pub async fn set_local_lock_timeout(&mut self, millis: u64) -> Result<()> {
        // SET does not accept bind parameters; millis is a plain integer.
        let sql = format!("SET LOCAL lock_timeout = {}", millis);
        sqlx::query(&sql).execute(&mut *self.conn).await?;
        Ok(())
    }
}
