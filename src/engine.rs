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

//! Ledger transaction engine.
//!
//! The [`Engine`] is the only writer to the entry log and the balance rows.
//! It validates that a [`TransactionRequest`] is a balanced double-entry
//! transaction and then, inside one store transaction:
//!
//! 1. appends one immutable [`LedgerEntry`] per requested entry, all sharing a
//!    freshly generated [`TransactionId`];
//! 2. applies each account's net delta (credits minus debits) to its balance
//!    row, in ascending account order;
//! 3. rejects the whole transaction if a floor-guarded account would end
//!    below zero.
//!
//! Any failure drops the store transaction, which rolls it back.
//!
//! # Thread Safety
//!
//! The engine holds no locks of its own. Overlapping transactions serialise on
//! the store's row locks, which are always taken in ascending account order.

use crate::base::{AccountId, Direction, EntryId, TransactionId};
use crate::entry::{EntryRequest, LedgerEntry, TransactionRequest};
use crate::error::{LedgerError, StoreError};
use crate::store::{LedgerStore, StoreTransaction};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Double-entry transaction engine over a [`LedgerStore`].
///
/// # Invariants
///
/// - Every committed transaction has at least two entries and equal debit
///   and credit totals.
/// - A balance row always equals the signed sum of its account's entries.
/// - Entries and balance deltas of one transaction commit together or not at all.
pub struct Engine<S> {
    store: Arc<S>,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> Engine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Engine { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validates and atomically commits a balanced transaction.
    ///
    /// Returns the generated transaction identifier. Reference identifiers are
    /// audit keys only; duplicates are accepted.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnbalancedTransaction`] - fewer than two entries, or debits != credits.
    /// - [`LedgerError::NegativeMagnitude`] - an entry carries a negative amount.
    /// - [`LedgerError::BalanceFloor`] - a guarded account would go negative.
    /// - [`LedgerError::Store`] - the store failed; nothing was written.
    pub fn commit(&self, request: TransactionRequest) -> Result<TransactionId, LedgerError> {
        let deltas = net_deltas(&request.entries)?;

        let transaction_id = TransactionId::generate();
        debug!(
            %transaction_id,
            reference_id = %request.reference_id,
            entries = request.entries.len(),
            "committing transaction"
        );

        match self.write(transaction_id, &request, &deltas) {
            Ok(()) => {
                info!(
                    %transaction_id,
                    reference_id = %request.reference_id,
                    accounts = deltas.len(),
                    "transaction committed"
                );
                Ok(transaction_id)
            }
            Err(LedgerError::Store(err)) => {
                error!(
                    %transaction_id,
                    reference_id = %request.reference_id,
                    error = %err,
                    "transaction rolled back on store failure"
                );
                Err(LedgerError::Store(err))
            }
            Err(err) => {
                debug!(%transaction_id, error = %err, "transaction rejected");
                Err(err)
            }
        }
    }

    fn write(
        &self,
        transaction_id: TransactionId,
        request: &TransactionRequest,
        deltas: &BTreeMap<AccountId, Decimal>,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let rows = request
            .entries
            .iter()
            .map(|entry| LedgerEntry {
                id: EntryId::generate(),
                transaction_id,
                account_id: entry.account_id.clone(),
                amount: entry.amount,
                direction: entry.direction,
                reference_id: request.reference_id.clone(),
                description: request.description.clone(),
                created_at: now,
            })
            .collect();

        // Early returns drop `tx`, rolling back everything staged so far.
        let mut tx = self.store.begin()?;
        tx.append_entries(rows)?;

        // BTreeMap iteration is ascending, which fixes the row lock order.
        for (account_id, delta) in deltas {
            let balance = tx
                .add_to_balance(account_id, *delta, now)
                .map_err(|err| match err {
                    StoreError::Overflow => LedgerError::AmountOverflow,
                    err => LedgerError::Store(err),
                })?;
            if balance < Decimal::ZERO && request.non_negative.contains(account_id) {
                tx.rollback();
                return Err(LedgerError::BalanceFloor {
                    account: account_id.clone(),
                    balance,
                });
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Current balance of an account; zero if it has never been touched.
    pub fn balance(&self, account_id: &AccountId) -> Result<Decimal, LedgerError> {
        Ok(self
            .store
            .balance(account_id)?
            .map_or(Decimal::ZERO, |balance| balance.amount))
    }

    /// Recomputes a balance from the entry log alone.
    pub fn replay_balance(&self, account_id: &AccountId) -> Result<Decimal, LedgerError> {
        self.store
            .entries(account_id)?
            .iter()
            .try_fold(Decimal::ZERO, |sum, entry| {
                sum.checked_add(entry.delta())
                    .ok_or(LedgerError::AmountOverflow)
            })
    }

    /// Whether the materialised balance matches the entry log.
    pub fn verify_balance(&self, account_id: &AccountId) -> Result<bool, LedgerError> {
        Ok(self.balance(account_id)? == self.replay_balance(account_id)?)
    }

    /// Committed entries of an account, oldest first.
    pub fn entries(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.entries(account_id)?)
    }

    /// All entries of one committed transaction.
    pub fn transaction(&self, transaction_id: TransactionId) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.transaction_entries(transaction_id)?)
    }
}

/// Checks the double-entry rules and folds entries into per-account deltas.
fn net_deltas(entries: &[EntryRequest]) -> Result<BTreeMap<AccountId, Decimal>, LedgerError> {
    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;
    let mut deltas: BTreeMap<AccountId, Decimal> = BTreeMap::new();

    for entry in entries {
        if entry.amount < Decimal::ZERO {
            return Err(LedgerError::NegativeMagnitude {
                account: entry.account_id.clone(),
                amount: entry.amount,
            });
        }
        let total = match entry.direction {
            Direction::Debit => &mut debits,
            Direction::Credit => &mut credits,
        };
        *total = total
            .checked_add(entry.amount)
            .ok_or(LedgerError::AmountOverflow)?;

        let delta = deltas.entry(entry.account_id.clone()).or_insert(Decimal::ZERO);
        *delta = delta
            .checked_add(entry.delta())
            .ok_or(LedgerError::AmountOverflow)?;
    }

    if entries.len() < 2 || debits != credits {
        return Err(LedgerError::UnbalancedTransaction { debits, credits });
    }
    Ok(deltas)
}
