//! Row types for the ledger tables

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::currency::Currency;

/// Account row (`accounts`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    /// Minor currency units
    pub balance: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// Ledger line against one account (`entries`). Negative amount = debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Money movement between two accounts (`transfers`).
///
/// `amount` is always in the source account's currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Transfer joined with the currencies of both accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TransferHistoryItem {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub from_currency: Currency,
    #[sqlx(try_from = "String")]
    pub to_currency: Currency,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Default)]
pub struct ListAccountsParams {
    pub owner: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ListTransfersParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Same-currency transfer input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

/// Cross-currency transfer input. `to_amount` is already converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TransferTxFxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub from_amount: i64,
    pub to_amount: i64,
    pub rate: Decimal,
}

/// Everything one committed transfer produced. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Cross-currency outcome: the same rows plus the amounts and informational rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FxTransferTxResult {
    #[serde(flatten)]
    pub result: TransferTxResult,
    pub from_amount: i64,
    pub to_amount: i64,
    pub rate: Decimal,
}
