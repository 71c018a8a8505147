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

//! # Wallet Ledger
//!
//! A digital wallet whose balances are derived entirely from an append-only,
//! double-entry ledger.
//!
//! ## Core Components
//!
//! - [`Engine`]: Validates balanced entry sets and commits entries plus balance deltas atomically
//! - [`Wallet`]: Turns deposits, withdrawals, transfers and account openings into ledger transactions
//! - [`LedgerStore`] / [`AccountRegistry`]: Persistence seams, with in-memory implementations
//! - [`AccountError`] / [`LedgerError`]: Error types for rejected or failed operations
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal_macros::dec;
//! use wallet_ledger::{Engine, MemoryRegistry, MemoryStore, Wallet, WalletConfig};
//!
//! let config = WalletConfig::default();
//! let engine = Engine::new(Arc::new(MemoryStore::new()));
//! let wallet = Wallet::new(engine, Arc::new(MemoryRegistry::new()), &config);
//! wallet.bootstrap().unwrap();
//!
//! let alice = wallet.create_account(Some("alice@example.com"), dec!(100.00), None).unwrap();
//! let bob = wallet.create_account(Some("bob@example.com"), dec!(0), None).unwrap();
//!
//! wallet.transfer(&alice.account.id, &bob.account.id, dec!(30.00), None).unwrap();
//!
//! assert_eq!(wallet.balance(&alice.account.id).unwrap(), dec!(70.00));
//! assert_eq!(wallet.balance(&bob.account.id).unwrap(), dec!(30.00));
//! ```
//!
//! ## Thread Safety
//!
//! Operations may run concurrently from any number of threads. The engine
//! relies on the store's row locks, acquired in ascending account order, and
//! re-checks debited user balances inside the commit so concurrent
//! withdrawals cannot overdraw an account.

pub mod account;
mod base;
pub mod config;
mod engine;
mod entry;
pub mod error;
pub mod store;
pub mod telemetry;
mod wallet;

pub use account::{Account, AccountSnapshot, AccountType};
pub use base::{AccountId, Direction, EntryId, TransactionId, parse_amount};
pub use config::{ConfigError, LogConfig, SystemAccounts, WalletConfig};
pub use engine::Engine;
pub use entry::{EntryRequest, LedgerEntry, TransactionRequest};
pub use error::{AccountError, AccountRole, ErrorKind, LedgerError, Operation, StoreError};
pub use store::memory::{Fault, MemoryStore};
pub use store::registry::MemoryRegistry;
pub use store::{AccountRegistry, Balance, LedgerStore, StoreTransaction};
pub use wallet::{CreatedAccount, HistoryPage, ReferralOutcome, Receipt, Wallet};
