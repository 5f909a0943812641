//! Ledger Error Types
//!
//! One error type for the whole ledger core. The entity store and the locking
//! protocol return these unchanged; only the transaction executor wraps them
//! (to attach rollback context).

use thiserror::Error;

use crate::currency::Currency;

/// Ledger error types
#[derive(Error, Debug)]
pub enum LedgerError {
    // === Lookup Errors ===
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    // === Constraint Errors ===
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("No exchange rate from {from} to {to}")]
    ConversionUnsupported { from: Currency, to: Currency },

    #[error("Insufficient funds in account {account_id} (balance would be {balance})")]
    InsufficientFunds { account_id: i64, balance: i64 },

    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Source and destination accounts are the same")]
    SameAccount,

    #[error("Amount too small for conversion")]
    AmountTooSmall,

    #[error("Source account currency mismatch: {account} vs {requested}")]
    CurrencyMismatch {
        account: Currency,
        requested: Currency,
    },

    #[error("Account {0} doesn't belong to the authenticated user")]
    Forbidden(i64),

    #[error("Recipient does not own destination account {account_id}")]
    RecipientMismatch { account_id: i64 },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    // === Transaction Errors ===
    #[error("tx err: {cause}, rb err: {rollback}")]
    RollbackFailed {
        cause: Box<LedgerError>,
        rollback: sqlx::Error,
    },

    #[error("Commit failed: {0}")]
    CommitFailed(sqlx::Error),

    #[error("Transaction cancelled")]
    Cancelled,

    // === System Errors ===
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            LedgerError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            LedgerError::ConversionUnsupported { .. } => "CONVERSION_UNSUPPORTED",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::SameAccount => "SAME_ACCOUNT",
            LedgerError::AmountTooSmall => "AMOUNT_TOO_SMALL",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::RecipientMismatch { .. } => "RECIPIENT_MISMATCH",
            LedgerError::InvalidPagination(_) => "INVALID_PAGINATION",
            LedgerError::RollbackFailed { .. } | LedgerError::CommitFailed(_) => {
                "TRANSACTION_FAILURE"
            }
            LedgerError::Cancelled => "CANCELLED",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Forbidden(_) => 403,
            LedgerError::NotFound { .. } => 404,
            LedgerError::UnsupportedCurrency(_)
            | LedgerError::ConversionUnsupported { .. }
            | LedgerError::InvalidAmount
            | LedgerError::SameAccount
            | LedgerError::AmountTooSmall
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::RecipientMismatch { .. }
            | LedgerError::InvalidPagination(_) => 400,
            LedgerError::ConstraintViolation(_) | LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::Cancelled => 503,
            LedgerError::RollbackFailed { .. }
            | LedgerError::CommitFailed(_)
            | LedgerError::Database(_)
            | LedgerError::Internal(_) => 500,
        }
    }

    /// True for the `NotFound` kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }

    /// The application error that triggered a failed rollback, or `self`.
    pub fn root_cause(&self) -> &LedgerError {
        match self {
            LedgerError::RollbackFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        // SQLSTATE class 23 = integrity constraint violation, 22P02 = invalid text representation
        let constraint = e
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.starts_with("23") || code == "22P02")
            .unwrap_or(false);

        if constraint {
            LedgerError::ConstraintViolation(e.to_string())
        } else {
            LedgerError::Database(e)
        }
    }
}
