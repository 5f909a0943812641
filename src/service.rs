//! Ledger service
//!
//! Caller-side checks in front of the [`Store`] contract: ownership, amount
//! and currency validation, and routing between the same-currency and the
//! cross-currency transfer. The store itself trusts its inputs.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::currency::Currency;
use crate::db::{
    Account, CreateAccountParams, FxTransferTxResult, ListAccountsParams, Store,
    TransferHistoryItem, TransferTxFxParams, TransferTxParams, TransferTxResult,
};
use crate::error::{LedgerError, Result};
use crate::fx;

/// Largest page accepted by [`LedgerService::transfer_history`]
pub const MAX_PAGE_SIZE: i64 = 50;

/// Outcome of [`LedgerService::transfer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TransferOutcome {
    Same(TransferTxResult),
    Fx(FxTransferTxResult),
}

impl TransferOutcome {
    pub fn result(&self) -> &TransferTxResult {
        match self {
            TransferOutcome::Same(r) => r,
            TransferOutcome::Fx(fx) => &fx.result,
        }
    }
}

/// Transfer request as an authenticated caller submits it
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    /// If given, must match the source account currency
    pub currency: Option<Currency>,
    /// If given, must match the destination account owner
    pub to_owner: Option<String>,
}

pub struct LedgerService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for LedgerService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> LedgerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn open_account(
        &self,
        owner: &str,
        currency: Currency,
        initial_balance: i64,
    ) -> Result<Account> {
        if initial_balance < 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let account = self
            .store
            .create_account(CreateAccountParams {
                owner: owner.to_string(),
                balance: initial_balance,
                currency,
            })
            .await?;

        info!(account_id = account.id, owner = %account.owner, currency = %account.currency, "Account opened");
        Ok(account)
    }

    /// Fetch an account owned by `owner`.
    pub async fn owned_account(&self, owner: &str, account_id: i64) -> Result<Account> {
        let account = self.store.get_account(account_id).await?;
        if account.owner != owner {
            warn!(account_id, owner, "account ownership check failed");
            return Err(LedgerError::Forbidden(account_id));
        }
        Ok(account)
    }

    pub async fn accounts_of(&self, owner: &str, limit: i64, offset: i64) -> Result<Vec<Account>> {
        self.store
            .list_accounts(ListAccountsParams {
                owner: Some(owner.to_string()),
                limit,
                offset,
            })
            .await
    }

    /// Move `amount` (source currency) from an account of `owner` to any account.
    ///
    /// Same currency runs the plain transfer; otherwise the amount is
    /// converted with the fixed rate table first.
    pub async fn transfer(
        &self,
        owner: &str,
        req: TransferRequest,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        if req.amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if req.from_account_id == req.to_account_id {
            return Err(LedgerError::SameAccount);
        }

        let from = self.owned_account(owner, req.from_account_id).await?;
        if let Some(requested) = req.currency {
            if requested != from.currency {
                return Err(LedgerError::CurrencyMismatch {
                    account: from.currency,
                    requested,
                });
            }
        }

        let to = self.store.get_account(req.to_account_id).await?;
        if let Some(expected_owner) = req.to_owner.as_deref() {
            if expected_owner != to.owner {
                return Err(LedgerError::RecipientMismatch { account_id: to.id });
            }
        }

        if from.currency == to.currency {
            let result = self
                .store
                .open_transfer(
                    TransferTxParams {
                        from_account_id: from.id,
                        to_account_id: to.id,
                        amount: req.amount,
                    },
                    cancel,
                )
                .await?;
            return Ok(TransferOutcome::Same(result));
        }

        let conversion = fx::convert_amount(req.amount, from.currency, to.currency)?;
        if conversion.to_amount <= 0 {
            return Err(LedgerError::AmountTooSmall);
        }

        let result = self
            .store
            .open_transfer_with_conversion(
                TransferTxFxParams {
                    from_account_id: from.id,
                    to_account_id: to.id,
                    from_amount: conversion.from_amount,
                    to_amount: conversion.to_amount,
                    rate: conversion.rate,
                },
                cancel,
            )
            .await?;
        Ok(TransferOutcome::Fx(result))
    }

    /// Credit `amount` to an account of `owner`.
    pub async fn deposit(&self, owner: &str, account_id: i64, amount: i64) -> Result<Account> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.owned_account(owner, account_id).await?;
        self.store.adjust_account_balance(account_id, amount).await
    }

    /// Transfers touching any account of `owner`, newest first. `page_id` starts at 1.
    pub async fn transfer_history(
        &self,
        owner: &str,
        page_id: i64,
        page_size: i64,
    ) -> Result<Vec<TransferHistoryItem>> {
        let offset = page_offset(page_id, page_size)?;
        self.store
            .list_transfers_by_owner(owner, page_size, offset)
            .await
    }
}

fn page_offset(page_id: i64, page_size: i64) -> Result<i64> {
    if page_id < 1 || !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(LedgerError::InvalidPagination(format!(
            "page_id={} page_size={}",
            page_id, page_size
        )));
    }
    (page_id - 1)
        .checked_mul(page_size)
        .ok_or_else(|| LedgerError::InvalidPagination(format!("page_id={} too large", page_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Entry, ListTransfersParams, Transfer};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that records which transfer path was taken
    #[derive(Default)]
    struct MockStore {
        accounts: Mutex<Vec<Account>>,
        same_calls: AtomicUsize,
        fx_calls: Mutex<Vec<TransferTxFxParams>>,
        adjustments: Mutex<Vec<(i64, i64)>>,
    }

    impl MockStore {
        fn with_accounts(accounts: &[(i64, &str, i64, Currency)]) -> Self {
            let store = MockStore::default();
            *store.accounts.lock().unwrap() = accounts
                .iter()
                .map(|(id, owner, balance, currency)| Account {
                    id: *id,
                    owner: owner.to_string(),
                    balance: *balance,
                    currency: *currency,
                    created_at: Utc::now(),
                })
                .collect();
            store
        }

        fn find(&self, id: i64) -> Result<Account> {
            self.accounts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .ok_or(LedgerError::NotFound {
                    entity: "account",
                    id,
                })
        }

        fn fake_result(&self, from: i64, to: i64, debit: i64, credit: i64) -> TransferTxResult {
            let now = Utc::now();
            let mut from_account = self.find(from).unwrap();
            let mut to_account = self.find(to).unwrap();
            from_account.balance -= debit;
            to_account.balance += credit;
            TransferTxResult {
                transfer: Transfer {
                    id: 1,
                    from_account_id: from,
                    to_account_id: to,
                    amount: debit,
                    created_at: now,
                },
                from_account,
                to_account,
                from_entry: Entry {
                    id: 1,
                    account_id: from,
                    amount: -debit,
                    created_at: now,
                },
                to_entry: Entry {
                    id: 2,
                    account_id: to,
                    amount: credit,
                    created_at: now,
                },
            }
        }
    }

    #[async_trait]
    impl Store for MockStore {
        async fn create_account(&self, arg: CreateAccountParams) -> Result<Account> {
            let mut accounts = self.accounts.lock().unwrap();
            let account = Account {
                id: accounts.len() as i64 + 1,
                owner: arg.owner,
                balance: arg.balance,
                currency: arg.currency,
                created_at: Utc::now(),
            };
            accounts.push(account.clone());
            Ok(account)
        }

        async fn get_account(&self, id: i64) -> Result<Account> {
            self.find(id)
        }

        async fn list_accounts(&self, arg: ListAccountsParams) -> Result<Vec<Account>> {
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .iter()
                .filter(|a| arg.owner.as_deref().is_none_or(|o| o == a.owner))
                .skip(arg.offset as usize)
                .take(arg.limit as usize)
                .cloned()
                .collect())
        }

        async fn adjust_account_balance(&self, id: i64, delta: i64) -> Result<Account> {
            self.adjustments.lock().unwrap().push((id, delta));
            let mut account = self.find(id)?;
            account.balance += delta;
            Ok(account)
        }

        async fn open_transfer(
            &self,
            arg: TransferTxParams,
            _cancel: &CancellationToken,
        ) -> Result<TransferTxResult> {
            self.same_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.fake_result(arg.from_account_id, arg.to_account_id, arg.amount, arg.amount))
        }

        async fn open_transfer_with_conversion(
            &self,
            arg: TransferTxFxParams,
            _cancel: &CancellationToken,
        ) -> Result<FxTransferTxResult> {
            self.fx_calls.lock().unwrap().push(arg);
            Ok(FxTransferTxResult {
                result: self.fake_result(
                    arg.from_account_id,
                    arg.to_account_id,
                    arg.from_amount,
                    arg.to_amount,
                ),
                from_amount: arg.from_amount,
                to_amount: arg.to_amount,
                rate: arg.rate,
            })
        }

        async fn get_transfer(&self, id: i64) -> Result<Transfer> {
            Err(LedgerError::NotFound {
                entity: "transfer",
                id,
            })
        }

        async fn list_transfers(&self, _arg: ListTransfersParams) -> Result<Vec<Transfer>> {
            Ok(Vec::new())
        }

        async fn list_transfers_by_owner(
            &self,
            _owner: &str,
            _limit: i64,
            _offset: i64,
        ) -> Result<Vec<TransferHistoryItem>> {
            Ok(Vec::new())
        }

        async fn list_entries(
            &self,
            _account_id: i64,
            _limit: i64,
            _offset: i64,
        ) -> Result<Vec<Entry>> {
            Ok(Vec::new())
        }

        async fn sum_entries(&self, _account_id: i64) -> Result<i64> {
            Ok(0)
        }
    }

    fn service(accounts: &[(i64, &str, i64, Currency)]) -> LedgerService<MockStore> {
        LedgerService::new(Arc::new(MockStore::with_accounts(accounts)))
    }

    fn request(from: i64, to: i64, amount: i64) -> TransferRequest {
        TransferRequest {
            from_account_id: from,
            to_account_id: to,
            amount,
            currency: None,
            to_owner: None,
        }
    }

    #[tokio::test]
    async fn test_same_currency_routes_to_plain_transfer() {
        let svc = service(&[(1, "alice", 1000, Currency::INR), (2, "bob", 500, Currency::INR)]);
        let cancel = CancellationToken::new();

        let outcome = svc.transfer("alice", request(1, 2, 150), &cancel).await.unwrap();

        assert!(matches!(outcome, TransferOutcome::Same(_)));
        assert_eq!(outcome.result().from_account.balance, 850);
        assert_eq!(outcome.result().to_account.balance, 650);
        assert_eq!(svc.store().same_calls.load(Ordering::SeqCst), 1);
        assert!(svc.store().fx_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_currency_converts_before_transfer() {
        let svc = service(&[(1, "alice", 1000, Currency::USD), (2, "bob", 0, Currency::INR)]);
        let cancel = CancellationToken::new();

        let outcome = svc.transfer("alice", request(1, 2, 10), &cancel).await.unwrap();

        let TransferOutcome::Fx(fx) = outcome else {
            panic!("expected fx transfer");
        };
        assert_eq!(fx.from_amount, 10);
        assert_eq!(fx.to_amount, 830);
        assert_eq!(fx.result.transfer.amount, 10);
        assert_eq!(svc.store().same_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conversion_rounding_to_zero_is_rejected() {
        let svc = service(&[(1, "alice", 1000, Currency::INR), (2, "bob", 0, Currency::EUR)]);
        let cancel = CancellationToken::new();

        let err = svc.transfer("alice", request(1, 2, 10), &cancel).await.unwrap_err();
        assert!(matches!(err, LedgerError::AmountTooSmall));
        assert!(svc.store().fx_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exact_half_unit_conversion_is_credited() {
        let svc = service(&[(1, "alice", 1000, Currency::INR), (2, "bob", 0, Currency::EUR)]);
        let cancel = CancellationToken::new();

        // 45 INR is exactly half a euro
        let outcome = svc.transfer("alice", request(1, 2, 45), &cancel).await.unwrap();
        let TransferOutcome::Fx(fx) = outcome else {
            panic!("expected fx transfer");
        };
        assert_eq!(fx.to_amount, 1);
        assert_eq!(svc.store().fx_calls.lock().unwrap()[0].to_amount, 1);
    }

    #[tokio::test]
    async fn test_transfer_validation() {
        let svc = service(&[(1, "alice", 1000, Currency::INR), (2, "bob", 500, Currency::INR)]);
        let cancel = CancellationToken::new();

        let err = svc.transfer("alice", request(1, 2, 0), &cancel).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount));

        let err = svc.transfer("alice", request(1, 1, 10), &cancel).await.unwrap_err();
        assert!(matches!(err, LedgerError::SameAccount));

        let err = svc.transfer("bob", request(1, 2, 10), &cancel).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(1)));

        let err = svc.transfer("alice", request(1, 99, 10), &cancel).await.unwrap_err();
        assert!(err.is_not_found());

        let mut req = request(1, 2, 10);
        req.currency = Some(Currency::USD);
        let err = svc.transfer("alice", req, &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::CurrencyMismatch {
                account: Currency::INR,
                requested: Currency::USD
            }
        ));

        let mut req = request(1, 2, 10);
        req.to_owner = Some("carol".to_string());
        let err = svc.transfer("alice", req, &cancel).await.unwrap_err();
        assert!(matches!(err, LedgerError::RecipientMismatch { account_id: 2 }));
        assert_eq!(err.http_status(), 400);

        assert_eq!(svc.store().same_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deposit_checks_owner_and_amount() {
        let svc = service(&[(1, "alice", 100, Currency::INR)]);

        let account = svc.deposit("alice", 1, 50).await.unwrap();
        assert_eq!(account.balance, 150);
        assert_eq!(*svc.store().adjustments.lock().unwrap(), vec![(1, 50)]);

        assert!(matches!(
            svc.deposit("alice", 1, -5).await,
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            svc.deposit("mallory", 1, 5).await,
            Err(LedgerError::Forbidden(1))
        ));
    }

    #[tokio::test]
    async fn test_open_account_rejects_negative_balance() {
        let svc = service(&[]);
        assert!(matches!(
            svc.open_account("alice", Currency::EUR, -1).await,
            Err(LedgerError::InvalidAmount)
        ));
        let account = svc.open_account("alice", Currency::EUR, 0).await.unwrap();
        assert_eq!(account.currency, Currency::EUR);
        assert_eq!(svc.accounts_of("alice", 10, 0).await.unwrap().len(), 1);
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 40);
        assert!(page_offset(0, 10).is_err());
        assert!(page_offset(1, 0).is_err());
        assert!(page_offset(1, MAX_PAGE_SIZE + 1).is_err());
    }
}
