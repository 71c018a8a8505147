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

//! Thread-safe account registry with unique identifiers and emails.

use super::AccountRegistry;
use crate::account::Account;
use crate::base::AccountId;
use crate::error::StoreError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// An append-only registry of accounts.
///
/// Uses the [`DashMap`] entry API for atomic check-and-insert on both the
/// identifier and the email, so concurrent creations cannot claim the same
/// key twice.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    accounts: DashMap<AccountId, Account>,
    /// Email to owning account, for uniqueness checks.
    emails: DashMap<String, AccountId>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountRegistry for MemoryRegistry {
    fn insert(&self, account: Account) -> Result<Account, StoreError> {
        // Reserve the email first; released again if the id turns out taken.
        if let Some(email) = &account.email {
            match self.emails.entry(email.clone()) {
                Entry::Occupied(_) => return Err(StoreError::Conflict),
                Entry::Vacant(entry) => {
                    entry.insert(account.id.clone());
                }
            }
        }

        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => {
                if let Some(email) = &account.email {
                    self.emails.remove(email);
                }
                Err(StoreError::Conflict)
            }
            Entry::Vacant(entry) => {
                entry.insert(account.clone());
                Ok(account)
            }
        }
    }

    fn get(&self, account_id: &AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(account_id).map(|account| account.clone()))
    }
}
