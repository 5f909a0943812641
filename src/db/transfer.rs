//! Transfer Orchestrator
//!
//! Double-entry transfers between two accounts, each run as one transaction:
//!
//! ```text
//! BEGIN
//!   INSERT transfer (from, to, amount)
//!   INSERT entry (from, -debit)
//!   INSERT entry (to,   +credit)
//!   UPDATE balances in ascending account id order (atomic increments)
//!   check balance policy on the source account
//! COMMIT            -- or ROLLBACK on any error, nothing from the attempt survives
//! ```

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::models::{FxTransferTxResult, TransferTxFxParams, TransferTxParams, TransferTxResult};
use super::queries::TxQueries;
use super::store::{BalancePolicy, SqlStore};
use crate::error::Result;

/// Amounts of one transfer, already in each account's currency
#[derive(Debug, Clone, Copy)]
struct Legs {
    from_account_id: i64,
    to_account_id: i64,
    debit: i64,
    credit: i64,
}

impl From<TransferTxParams> for Legs {
    fn from(arg: TransferTxParams) -> Self {
        Self {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            debit: arg.amount,
            credit: arg.amount,
        }
    }
}

impl From<TransferTxFxParams> for Legs {
    fn from(arg: TransferTxFxParams) -> Self {
        Self {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            debit: arg.from_amount,
            credit: arg.to_amount,
        }
    }
}

async fn record_transfer(
    q: &mut TxQueries,
    legs: Legs,
    policy: BalancePolicy,
) -> Result<TransferTxResult> {
    let transfer = q
        .create_transfer(legs.from_account_id, legs.to_account_id, legs.debit)
        .await?;

    let from_entry = q.create_entry(legs.from_account_id, -legs.debit).await?;
    let to_entry = q.create_entry(legs.to_account_id, legs.credit).await?;

    let (from_account, to_account) = q
        .apply_balance_deltas(
            (legs.from_account_id, -legs.debit),
            (legs.to_account_id, legs.credit),
        )
        .await?;

    // source row is locked by the update above
    policy.check(&from_account)?;

    debug!(
        transfer_id = transfer.id,
        from_balance = from_account.balance,
        to_balance = to_account.balance,
        "transfer recorded"
    );

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

impl SqlStore {
    /// Same-currency transfer: debit and credit are both `amount`.
    pub async fn transfer_tx(&self, arg: TransferTxParams) -> Result<TransferTxResult> {
        self.transfer_tx_cancellable(arg, &CancellationToken::new())
            .await
    }

    pub async fn transfer_tx_cancellable(
        &self,
        arg: TransferTxParams,
        cancel: &CancellationToken,
    ) -> Result<TransferTxResult> {
        let policy = self.options().balance_policy;
        let result = self
            .exec_tx_cancellable(cancel, move |q| {
                Box::pin(record_transfer(q, Legs::from(arg), policy))
            })
            .await?;

        info!(
            transfer_id = result.transfer.id,
            from_account_id = arg.from_account_id,
            to_account_id = arg.to_account_id,
            amount = arg.amount,
            "Transfer committed"
        );
        Ok(result)
    }

    /// Cross-currency transfer: debit `from_amount`, credit `to_amount`.
    ///
    /// The transfer row stores `from_amount`; `rate` is only echoed back.
    pub async fn transfer_tx_fx(&self, arg: TransferTxFxParams) -> Result<FxTransferTxResult> {
        self.transfer_tx_fx_cancellable(arg, &CancellationToken::new())
            .await
    }

    pub async fn transfer_tx_fx_cancellable(
        &self,
        arg: TransferTxFxParams,
        cancel: &CancellationToken,
    ) -> Result<FxTransferTxResult> {
        let policy = self.options().balance_policy;
        let result = self
            .exec_tx_cancellable(cancel, move |q| {
                Box::pin(record_transfer(q, Legs::from(arg), policy))
            })
            .await?;

        info!(
            transfer_id = result.transfer.id,
            from_account_id = arg.from_account_id,
            to_account_id = arg.to_account_id,
            from_amount = arg.from_amount,
            to_amount = arg.to_amount,
            rate = %arg.rate,
            "FX transfer committed"
        );
        Ok(FxTransferTxResult {
            result,
            from_amount: arg.from_amount,
            to_amount: arg.to_amount,
            rate: arg.rate,
        })
    }
}
