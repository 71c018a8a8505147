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

//! In-process ledger store.
//!
//! Balance rows live in a [`DashMap`] of individually locked rows. A
//! transaction takes a row lock the first time it touches an account and
//! holds it until commit or rollback, which serialises overlapping
//! transactions per account while leaving disjoint ones independent.
//! Callers that lock rows in ascending account order cannot deadlock.
//!
//! Staged entries and balance values are only published at commit, under
//! the log's write lock, so readers never observe half a transaction.

use super::{Balance, LedgerStore, StoreTransaction};
use crate::base::{AccountId, TransactionId};
use crate::entry::LedgerEntry;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A stage of the commit path at which a one-shot failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Begin,
    AppendEntries,
    ApplyBalance,
    Commit,
}

/// A balance row. `updated_at` is `None` until a commit first writes it, so a
/// row created by a rolled-back transaction reads as absent.
#[derive(Debug, Default)]
struct BalanceRow {
    amount: Decimal,
    updated_at: Option<DateTime<Utc>>,
}

type RowGuard = ArcMutexGuard<RawMutex, BalanceRow>;

/// In-memory [`LedgerStore`].
#[derive(Debug)]
pub struct MemoryStore {
    /// Append-only entry log in commit order.
    entries: RwLock<Vec<LedgerEntry>>,
    balances: DashMap<AccountId, Arc<Mutex<BalanceRow>>>,
    fault: Mutex<Option<Fault>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            balances: DashMap::new(),
            fault: Mutex::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Makes the next transaction fail when it reaches `fault`.
    pub fn inject_fault(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }

    /// Simulates the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of committed entries.
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn trip(&self, stage: Fault) -> Result<(), StoreError> {
        let mut fault = self.fault.lock();
        if *fault == Some(stage) {
            *fault = None;
            return Err(StoreError::Fault);
        }
        Ok(())
    }

    /// Clones the row handle without holding the map shard while locking it.
    fn row(&self, account_id: &AccountId) -> Option<Arc<Mutex<BalanceRow>>> {
        self.balances.get(account_id).map(|row| Arc::clone(row.value()))
    }

    fn row_or_insert(&self, account_id: &AccountId) -> Arc<Mutex<BalanceRow>> {
        Arc::clone(self.balances.entry(account_id.clone()).or_default().value())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged work of one [`MemoryStore`] transaction. Dropping it rolls back.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    staged_entries: Vec<LedgerEntry>,
    /// Locked rows with the value and timestamp they take on commit.
    rows: BTreeMap<AccountId, (RowGuard, Decimal, DateTime<Utc>)>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn append_entries(&mut self, entries: Vec<LedgerEntry>) -> Result<(), StoreError> {
        self.store.trip(Fault::AppendEntries)?;
        self.staged_entries.extend(entries);
        Ok(())
    }

    fn add_to_balance(
        &mut self,
        account_id: &AccountId,
        delta: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Decimal, StoreError> {
        self.store.trip(Fault::ApplyBalance)?;

        if let Some((_, staged, staged_at)) = self.rows.get_mut(account_id) {
            *staged = staged.checked_add(delta).ok_or(StoreError::Overflow)?;
            *staged_at = at;
            return Ok(*staged);
        }

        let guard = self.store.row_or_insert(account_id).lock_arc();
        let staged = guard.amount.checked_add(delta).ok_or(StoreError::Overflow)?;
        self.rows.insert(account_id.clone(), (guard, staged, at));
        Ok(staged)
    }

    fn commit(self) -> Result<(), StoreError> {
        self.store.ensure_available().map_err(|_| StoreError::CommitFailed)?;
        self.store.trip(Fault::Commit)?;

        let mut log = self.store.entries.write();
        log.extend(self.staged_entries);
        for (_, (mut guard, amount, at)) in self.rows {
            guard.amount = amount;
            guard.updated_at = Some(at);
        }
        Ok(())
    }

    fn rollback(self) {}
}

impl LedgerStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>, StoreError> {
        self.ensure_available()?;
        self.trip(Fault::Begin)?;
        Ok(MemoryTransaction {
            store: self,
            staged_entries: Vec::new(),
            rows: BTreeMap::new(),
        })
    }

    fn balance(&self, account_id: &AccountId) -> Result<Option<Balance>, StoreError> {
        self.ensure_available()?;
        let Some(row) = self.row(account_id) else {
            return Ok(None);
        };
        let row = row.lock();
        Ok(row.updated_at.map(|updated_at| Balance {
            account_id: account_id.clone(),
            amount: row.amount,
            updated_at,
        }))
    }

    fn balances(&self) -> Result<Vec<Balance>, StoreError> {
        self.ensure_available()?;
        let rows: Vec<_> = self
            .balances
            .iter()
            .map(|row| (row.key().clone(), Arc::clone(row.value())))
            .collect();

        let mut balances = Vec::with_capacity(rows.len());
        for (account_id, row) in rows {
            let row = row.lock();
            if let Some(updated_at) = row.updated_at {
                balances.push(Balance {
                    account_id,
                    amount: row.amount,
                    updated_at,
                });
            }
        }
        balances.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(balances)
    }

    fn entries(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|entry| &entry.account_id == account_id)
            .cloned()
            .collect())
    }

    fn transaction_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}
