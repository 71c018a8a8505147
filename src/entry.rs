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

//! Ledger entries and transaction requests.
//!
//! A [`TransactionRequest`] is what callers hand to the engine; every
//! [`EntryRequest`] in it becomes one immutable [`LedgerEntry`] on commit.

use crate::base::{AccountId, Direction, EntryId, TransactionId, parse_amount};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One side of a double-entry movement, before it is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRequest {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub direction: Direction,
}

impl EntryRequest {
    pub fn debit(account_id: impl Into<AccountId>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
            direction: Direction::Debit,
        }
    }

    pub fn credit(account_id: impl Into<AccountId>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
            direction: Direction::Credit,
        }
    }

    /// Builds an entry from wire text, rejecting malformed amounts and unknown directions.
    pub fn parse(
        account_id: impl Into<AccountId>,
        amount: &str,
        direction: &str,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            account_id: account_id.into(),
            amount: parse_amount(amount)?,
            direction: direction.parse()?,
        })
    }

    /// Contribution of this entry to its account balance.
    pub fn delta(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}

/// A set of entries to be committed as one balanced, atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub reference_id: String,
    pub description: String,
    pub entries: Vec<EntryRequest>,
    /// Accounts whose balance must not end the transaction below zero.
    pub non_negative: BTreeSet<AccountId>,
}

impl TransactionRequest {
    pub fn new(reference_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            reference_id: reference_id.into(),
            description: description.into(),
            entries: Vec::new(),
            non_negative: BTreeSet::new(),
        }
    }

    pub fn entry(mut self, entry: EntryRequest) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn debit(self, account_id: impl Into<AccountId>, amount: Decimal) -> Self {
        self.entry(EntryRequest::debit(account_id, amount))
    }

    pub fn credit(self, account_id: impl Into<AccountId>, amount: Decimal) -> Self {
        self.entry(EntryRequest::credit(account_id, amount))
    }

    /// Fails the whole commit if `account_id` would end up with a negative balance.
    pub fn require_non_negative(mut self, account_id: impl Into<AccountId>) -> Self {
        self.non_negative.insert(account_id.into());
        self
    }
}

/// A committed, immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub direction: Direction,
    pub reference_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn delta(&self) -> Decimal {
        self.direction.signed(self.amount)
    }
}
