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

//! Account records.
//!
//! Accounts are written once at creation and never mutated or deleted. They
//! carry no balance: balances live in the ledger's materialised balance rows.
//!
//! # Example
//!
//! ```
//! use wallet_ledger::{Account, AccountId, AccountType};
//!
//! let account = Account::system(AccountId::from("1004"));
//! assert_eq!(account.account_type, AccountType::System);
//! assert!(account.email.is_none());
//! ```

use crate::base::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    User,
    /// Funding source, disbursement and reward pool accounts.
    System,
}

/// Ledger account metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_type: AccountType,
    pub owner: Option<String>,
    pub email: Option<String>,
    pub referrer: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A user account owned by itself, as the wallet opens them.
    pub fn user(id: AccountId, email: Option<String>, referrer: Option<AccountId>) -> Self {
        Self {
            owner: Some(id.to_string()),
            id,
            account_type: AccountType::User,
            email,
            referrer,
            created_at: Utc::now(),
        }
    }

    pub fn system(id: AccountId) -> Self {
        Self {
            id,
            account_type: AccountType::System,
            owner: None,
            email: None,
            referrer: None,
            created_at: Utc::now(),
        }
    }
}

/// An account together with its balance at the time of the read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    #[serde(flatten)]
    pub account: Account,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn user_account_owns_itself() {
        let id = AccountId::from("acc-1");
        let account = Account::user(id.clone(), Some("a@example.com".into()), None);
        assert_eq!(account.account_type, AccountType::User);
        assert_eq!(account.owner.as_deref(), Some("acc-1"));
        assert_eq!(account.id, id);
    }

    #[test]
    fn snapshot_serializes_flat_with_string_balance() {
        let snapshot = AccountSnapshot {
            account: Account::user(
                AccountId::from("acc-1"),
                Some("a@example.com".into()),
                Some(AccountId::from("acc-0")),
            ),
            balance: dec!(70.00),
        };

        let parsed: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(parsed["id"], "acc-1");
        assert_eq!(parsed["account_type"], "USER");
        assert_eq!(parsed["referrer"], "acc-0");
        assert_eq!(parsed["balance"].as_str().unwrap(), "70.00");
    }
}
