// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistence interfaces.
//!
//! The engine needs two things from a store: an append-only entry log and an
//! add-or-initialise balance upsert, composable into one all-or-nothing
//! [`StoreTransaction`]. The wallet additionally needs an [`AccountRegistry`].
//!
//! In-process implementations live in [`memory`] and [`registry`].

use crate::account::Account;
use crate::base::{AccountId, TransactionId};
use crate::entry::LedgerEntry;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub mod memory;
pub mod registry;

/// Materialised balance row for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// One atomic unit of work against the ledger store.
///
/// Nothing staged through a transaction is visible to readers until
/// [`commit`](StoreTransaction::commit) succeeds. Dropping a transaction
/// without committing rolls it back, so every early return discards the
/// staged work.
pub trait StoreTransaction {
    /// Stages immutable entry rows for append.
    fn append_entries(&mut self, entries: Vec<LedgerEntry>) -> Result<(), StoreError>;

    /// Adds `delta` to the account balance, creating the row with `delta` if absent.
    ///
    /// The row stays locked until the transaction ends. Returns the balance
    /// as it will read after commit.
    fn add_to_balance(
        &mut self,
        account_id: &AccountId,
        delta: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Decimal, StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self);
}

/// Durable entry log plus balance rows.
pub trait LedgerStore: Send + Sync {
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;

    /// Current committed balance row, if the account ever had one.
    fn balance(&self, account_id: &AccountId) -> Result<Option<Balance>, StoreError>;

    /// Every materialised balance row.
    fn balances(&self) -> Result<Vec<Balance>, StoreError>;

    /// Committed entries for an account, oldest first.
    fn entries(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Committed entries sharing one transaction identifier.
    fn transaction_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Write-once registry of accounts.
pub trait AccountRegistry: Send + Sync {
    /// Records a new account.
    ///
    /// Fails with [`StoreError::Conflict`] if the identifier or email is taken.
    fn insert(&self, account: Account) -> Result<Account, StoreError>;

    fn get(&self, account_id: &AccountId) -> Result<Option<Account>, StoreError>;

    fn exists(&self, account_id: &AccountId) -> Result<bool, StoreError> {
        Ok(self.get(account_id)?.is_some())
    }
}
