//! bank_ledger - Double-entry ledger core
//!
//! Records account balances and moves money between accounts on PostgreSQL,
//! with every transfer applied atomically or not at all.
//!
//! # Modules
//!
//! - [`db`] - Entity store, transaction executor, locking protocol, transfers
//! - [`service`] - Caller-side validation and same/cross-currency routing
//! - [`currency`] - Supported currencies
//! - [`fx`] - Fixed exchange-rate table and conversion
//! - [`error`] - `LedgerError`
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//!
//! # Transfer flow
//!
//! ```text
//! caller ──▶ LedgerService::transfer ──▶ Store::open_transfer ──▶ SqlStore::exec_tx
//!                                                                   │
//!                 INSERT transfer, 2 entries; UPDATE balances in id order
//!                                                                   │
//!                                                          COMMIT / ROLLBACK
//! ```

pub mod config;
pub mod currency;
pub mod db;
pub mod error;
pub mod fx;
pub mod logging;
pub mod service;

// Convenient re-exports at crate root
pub use currency::Currency;
pub use db::{
    Account, BalancePolicy, Database, Entry, FxTransferTxResult, LockOrder, SqlStore, Store,
    StoreOptions, Transfer, TransferTxFxParams, TransferTxParams, TransferTxResult,
};
pub use error::{LedgerError, Result};
pub use service::{LedgerService, TransferOutcome, TransferRequest};
