//! Ledger store: transaction executor and the caller-facing contract.
//!
//! `SqlStore::exec_tx` is the only place transaction boundaries are decided.
//! Callers hand it a unit of work; it begins, runs, and commits or rolls back.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::models::{
    Account, CreateAccountParams, Entry, FxTransferTxResult, ListAccountsParams,
    ListTransfersParams, Transfer, TransferHistoryItem, TransferTxFxParams, TransferTxParams,
    TransferTxResult,
};
use super::queries::{PoolQueries, Queries, TxQueries};
use crate::error::{LedgerError, Result};

/// What happens when a debit would take an account below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Abort the transaction with `InsufficientFunds`
    #[default]
    Reject,
    /// Let balances go negative
    AllowOverdraft,
}

impl BalancePolicy {
    /// Check a post-update balance against the policy.
    pub fn check(&self, account: &Account) -> Result<()> {
        match self {
            BalancePolicy::Reject if account.balance < 0 => Err(LedgerError::InsufficientFunds {
                account_id: account.id,
                balance: account.balance,
            }),
            _ => Ok(()),
        }
    }
}

impl std::str::FromStr for BalancePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(BalancePolicy::Reject),
            "allow_overdraft" | "overdraft" => Ok(BalancePolicy::AllowOverdraft),
            _ => Err(format!("Invalid balance policy: {}", s)),
        }
    }
}

/// Per-store transaction settings
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    pub balance_policy: BalancePolicy,
    /// `SET LOCAL lock_timeout` for every transaction, if set
    pub lock_timeout_ms: Option<u64>,
}

/// Contract exposed to callers (HTTP handlers, jobs, tests).
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_account(&self, arg: CreateAccountParams) -> Result<Account>;

    /// `NotFound` when the id does not exist
    async fn get_account(&self, id: i64) -> Result<Account>;

    async fn list_accounts(&self, arg: ListAccountsParams) -> Result<Vec<Account>>;

    /// Deposit (positive) or withdrawal (negative), recorded as an entry.
    async fn adjust_account_balance(&self, id: i64, delta: i64) -> Result<Account>;

    /// Same-currency transfer; rolled back if `cancel` fires first.
    async fn open_transfer(
        &self,
        arg: TransferTxParams,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult>;

    /// Cross-currency transfer with a caller-converted credit amount.
    async fn open_transfer_with_conversion(
        &self,
        arg: TransferTxFxParams,
        cancel: &CancellationToken,
    ) -> Result<FxTransferTxResult>;

    async fn get_transfer(&self, id: i64) -> Result<Transfer>;

    async fn list_transfers(&self, arg: ListTransfersParams) -> Result<Vec<Transfer>>;

    async fn list_transfers_by_owner(
        &self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransferHistoryItem>>;

    async fn list_entries(&self, account_id: i64, limit: i64, offset: i64) -> Result<Vec<Entry>>;

    async fn sum_entries(&self, account_id: i64) -> Result<i64>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct SqlStore {
    pool: PgPool,
    options: StoreOptions,
}

impl SqlStore {
    pub fn new(pool: PgPool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Queries on a pooled connection, outside any explicit transaction
    pub async fn queries(&self) -> Result<PoolQueries> {
        let conn = self.pool.acquire().await?;
        Ok(Queries::new(conn))
    }

    /// Run `work` inside one database transaction.
    ///
    /// `Ok` commits; `Err` rolls back and returns the unit of work error, or
    /// `RollbackFailed` carrying both errors if the rollback itself fails.
    pub async fn exec_tx<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut TxQueries) -> BoxFuture<'q, Result<T>> + Send,
    {
        self.run_tx(None, work).await
    }

    /// Like [`exec_tx`](Self::exec_tx), but rolls back with `Cancelled` as
    /// soon as `cancel` fires while the transaction is open.
    pub async fn exec_tx_cancellable<T, F>(&self, cancel: &CancellationToken, work: F) -> Result<T>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut TxQueries) -> BoxFuture<'q, Result<T>> + Send,
    {
        self.run_tx(Some(cancel), work).await
    }

    async fn run_tx<T, F>(&self, cancel: Option<&CancellationToken>, work: F) -> Result<T>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut TxQueries) -> BoxFuture<'q, Result<T>> + Send,
    {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(LedgerError::Cancelled);
        }

        let tx = self.pool.begin().await?;
        let mut q = Queries::new(tx);
        let lock_timeout_ms = self.options.lock_timeout_ms;

        let outcome = tokio::select! {
            biased;
            _ = wait_cancelled(cancel) => {
                warn!("transaction cancelled by caller, rolling back");
                Err(LedgerError::Cancelled)
            }
            res = async {
                if let Some(ms) = lock_timeout_ms {
                    q.set_local_lock_timeout(ms).await?;
                }
                work(&mut q).await
            } => res,
        };

        finish_tx(q.into_inner(), outcome).await
    }
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

async fn finish_tx<T>(tx: Transaction<'static, Postgres>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(|e| {
                error!(error = %e, "Failed to commit transaction");
                LedgerError::CommitFailed(e)
            })?;
            Ok(value)
        }
        Err(cause) => {
            debug!(error = %cause, "unit of work failed, rolling back");
            if let Err(rollback) = tx.rollback().await {
                error!(error = %cause, rollback_error = %rollback, "Rollback failed");
                return Err(LedgerError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                });
            }
            Err(cause)
        }
    }
}

/// Balance change outside a transfer (deposit, withdrawal), mirrored by an entry
/// so the entries still replay to the balance.
async fn record_adjustment(
    q: &mut TxQueries,
    id: i64,
    delta: i64,
    policy: BalancePolicy,
) -> Result<Account> {
    // update first: a missing id is NotFound here, not an FK violation on the entry
    let account = q.add_account_balance(id, delta).await?;
    q.create_entry(id, delta).await?;
    if delta < 0 {
        policy.check(&account)?;
    }
    Ok(account)
}

#[async_trait]
impl Store for SqlStore {
    async fn create_account(&self, arg: CreateAccountParams) -> Result<Account> {
        self.queries().await?.create_account(&arg).await
    }

    async fn get_account(&self, id: i64) -> Result<Account> {
        self.queries().await?.get_account(id).await
    }

    async fn list_accounts(&self, arg: ListAccountsParams) -> Result<Vec<Account>> {
        self.queries().await?.list_accounts(&arg).await
    }

    async fn adjust_account_balance(&self, id: i64, delta: i64) -> Result<Account> {
        let policy = self.options.balance_policy;
        self.exec_tx(move |q| Box::pin(record_adjustment(q, id, delta, policy)))
            .await
    }

    async fn open_transfer(
        &self,
        arg: TransferTxParams,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult> {
        self.transfer_tx_cancellable(arg, cancel).await
    }

    async fn open_transfer_with_conversion(
        &self,
        arg: TransferTxFxParams,
        cancel: &CancellationToken,
    ) -> Result<FxTransferTxResult> {
        self.transfer_tx_fx_cancellable(arg, cancel).await
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer> {
        self.queries().await?.get_transfer(id).await
    }

    async fn list_transfers(&self, arg: ListTransfersParams) -> Result<Vec<Transfer>> {
        self.queries().await?.list_transfers(&arg).await
    }

    async fn list_transfers_by_owner(
        &self,
        owner: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransferHistoryItem>> {
        self.queries()
            .await?
            .list_transfers_by_owner(owner, limit, offset)
            .await
    }

    async fn list_entries(&self, account_id: i64, limit: i64, offset: i64) -> Result<Vec<Entry>> {
        self.queries()
            .await?
            .list_entries(account_id, limit, offset)
            .await
    }

    async fn sum_entries(&self, account_id: i64) -> Result<i64> {
        self.queries().await?.sum_entries(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use chrono::Utc;

    fn account(balance: i64) -> Account {
        Account {
            id: 1,
            owner: "alice".to_string(),
            balance,
            currency: Currency::INR,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reject_policy() {
        let policy = BalancePolicy::Reject;
        assert!(policy.check(&account(0)).is_ok());
        assert!(policy.check(&account(10)).is_ok());
        let err = policy.check(&account(-1)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                account_id: 1,
                balance: -1
            }
        ));
    }

    #[test]
    fn test_overdraft_policy() {
        assert!(BalancePolicy::AllowOverdraft.check(&account(-500)).is_ok());
    }

    #[test]
    fn test_policy_default_and_parse() {
        assert_eq!(BalancePolicy::default(), BalancePolicy::Reject);
        assert_eq!(
            "allow_overdraft".parse::<BalancePolicy>().unwrap(),
            BalancePolicy::AllowOverdraft
        );
        assert_eq!("REJECT".parse::<BalancePolicy>().unwrap(), BalancePolicy::Reject);
        assert!("maybe".parse::<BalancePolicy>().is_err());
    }

    #[test]
    fn test_policy_serde() {
        let p: BalancePolicy = serde_yaml::from_str("allow_overdraft").unwrap();
        assert_eq!(p, BalancePolicy::AllowOverdraft);
    }

    #[tokio::test]
    async fn test_cancelled_before_begin_never_touches_pool() {
        // connect_lazy does not open a connection until first use
        let pool = PgPool::connect_lazy("postgres://nobody@127.0.0.1:1/none").unwrap();
        let store = SqlStore::new(pool, StoreOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res: Result<()> = store
            .exec_tx_cancellable(&cancel, |_q| Box::pin(async { Ok(()) }))
            .await;
        assert!(matches!(res, Err(LedgerError::Cancelled)));
    }
}
