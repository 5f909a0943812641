//! Account Locking Protocol
//!
//! Every transaction that touches two accounts takes their row locks in
//! ascending id order, whatever the direction of the transfer. With one
//! global order there is no circular wait: of two transfers sharing accounts,
//! one gets both locks and the other blocks until it commits.
//!
//! ```text
//! T1: 1 -> 2   locks 1, then 2
//! T2: 2 -> 1   locks 1, then 2   (waits on 1, never holds 2 first)
//! ```

use std::ops::DerefMut;

use sqlx::PgConnection;
use tracing::trace;

use super::models::Account;
use super::queries::Queries;
use crate::error::{LedgerError, Result};

/// Acquisition order for a pair of account ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOrder {
    first: i64,
    second: i64,
}

impl LockOrder {
    pub fn new(a: i64, b: i64) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// The id locked first (the smaller one)
    #[inline]
    pub fn first(&self) -> i64 {
        self.first
    }

    #[inline]
    pub fn second(&self) -> i64 {
        self.second
    }

    /// Both ids are the same account: one lock only
    #[inline]
    pub fn is_single(&self) -> bool {
        self.first == self.second
    }

    /// Ids in acquisition order, without duplicates
    pub fn ids(&self) -> Vec<i64> {
        if self.is_single() {
            vec![self.first]
        } else {
            vec![self.first, self.second]
        }
    }
}

impl<C> Queries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    /// Lock both accounts in ascending id order.
    ///
    /// Returns the accounts in argument order: `(a, b)`.
    pub async fn lock_account_pair(&mut self, a: i64, b: i64) -> Result<(Account, Account)> {
        let order = LockOrder::new(a, b);
        trace!(first = order.first(), second = order.second(), "locking account pair");

        let first = self.get_account_for_update(order.first()).await?;
        if order.is_single() {
            return Ok((first.clone(), first));
        }
        let second = self.get_account_for_update(order.second()).await?;

        if a == order.first() {
            Ok((first, second))
        } else {
            Ok((second, first))
        }
    }

    /// Apply a signed delta to each of two accounts, ascending id first.
    ///
    /// Each delta is an atomic increment, which also takes the row lock.
    /// Returns the updated accounts in argument order. The same id twice is
    /// collapsed into one update and the account is returned twice.
    pub async fn apply_balance_deltas(
        &mut self,
        (a, delta_a): (i64, i64),
        (b, delta_b): (i64, i64),
    ) -> Result<(Account, Account)> {
        let order = LockOrder::new(a, b);

        if order.is_single() {
            let delta = delta_a
                .checked_add(delta_b)
                .ok_or_else(|| LedgerError::Internal("balance delta overflow".to_string()))?;
            let account = self.add_account_balance(a, delta).await?;
            return Ok((account.clone(), account));
        }

        if a == order.first() {
            let account_a = self.add_account_balance(a, delta_a).await?;
            let account_b = self.add_account_balance(b, delta_b).await?;
            Ok((account_a, account_b))
        } else {
            let account_b = self.add_account_balance(b, delta_b).await?;
            let account_a = self.add_account_balance(a, delta_a).await?;
            Ok((account_a, account_b))
        }
    }
}
