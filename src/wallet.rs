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

//! Wallet operations.
//!
//! The [`Wallet`] turns user-facing intents into two-entry ledger transactions
//! against the configured system accounts and routes them through the
//! [`Engine`].
//!
//! | Operation | Debit | Credit |
//! |-----------|-------|--------|
//! | Opening balance | funding source | new account |
//! | Referral reward | reward pool | referrer |
//! | Deposit | funding source | account |
//! | Withdrawal | account | funding source |
//! | Transfer | source | destination |
//!
//! Withdrawals and transfers check the balance up front for a descriptive
//! rejection, and also mark the debited account as non-negative so the
//! engine re-checks it under the row lock. Two concurrent withdrawals can
//! therefore never overdraw an account together.

use crate::account::{Account, AccountSnapshot};
use crate::base::{AccountId, TransactionId};
use crate::config::{SystemAccounts, WalletConfig};
use crate::engine::Engine;
use crate::entry::{LedgerEntry, TransactionRequest};
use crate::error::{AccountError, AccountRole, LedgerError, Operation, StoreError};
use crate::store::{AccountRegistry, LedgerStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub transaction_id: TransactionId,
    pub reference_id: String,
    /// Balance of the acted-on account (the source, for transfers) after commit.
    ///
    /// `None` if the follow-up read failed. The transaction is committed
    /// either way and must not be retried.
    pub balance: Option<Decimal>,
}

/// Outcome of the referral reward that follows a referred account creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralOutcome {
    Rewarded(TransactionId),
    /// The account was still created; only the reward is missing.
    Failed(LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAccount {
    pub account: Account,
    pub initial_funding: Option<TransactionId>,
    pub referral: Option<ReferralOutcome>,
}

/// One page of an account's entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl HistoryPage {
    pub const DEFAULT_PAGE_SIZE: usize = 20;
    pub const MAX_PAGE_SIZE: usize = 100;
}

/// Account operation composer.
pub struct Wallet<S, R> {
    engine: Engine<S>,
    registry: Arc<R>,
    system: SystemAccounts,
    referral_reward: Decimal,
}

impl<S: LedgerStore, R: AccountRegistry> Wallet<S, R> {
    pub fn new(engine: Engine<S>, registry: Arc<R>, config: &WalletConfig) -> Self {
        Self {
            engine,
            registry,
            system: config.system_accounts.clone(),
            referral_reward: config.referral_reward,
        }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    pub fn system_accounts(&self) -> &SystemAccounts {
        &self.system
    }

    /// Registers the configured system accounts. Already registered ones are left alone.
    pub fn bootstrap(&self) -> Result<(), AccountError> {
        for id in self.system.all() {
            if self.registry.exists(id)? {
                continue;
            }
            match self.registry.insert(Account::system(id.clone())) {
                Ok(_) => info!(account = %id, "registered system account"),
                // Lost a race with another bootstrap.
                Err(StoreError::Conflict) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Opens a user account, optionally funded and optionally referred.
    ///
    /// The referral reward is a separate follow-up transaction: its failure is
    /// logged and reported in [`CreatedAccount::referral`] but never undoes
    /// the account creation.
    ///
    /// # Errors
    ///
    /// - [`AccountError::NegativeInitialBalance`]
    /// - [`AccountError::InvalidReferrer`] - the referrer does not exist.
    /// - [`AccountError::EmailAlreadyExists`]
    /// - [`AccountError::InitialFundingFailed`] - the account exists but is unfunded.
    pub fn create_account(
        &self,
        email: Option<&str>,
        initial_balance: Decimal,
        referrer: Option<&AccountId>,
    ) -> Result<CreatedAccount, AccountError> {
        if initial_balance < Decimal::ZERO {
            return Err(AccountError::NegativeInitialBalance(initial_balance));
        }
        if let Some(referrer) = referrer {
            if !self.registry.exists(referrer)? {
                debug!(referrer = %referrer, "rejecting unknown referrer");
                return Err(AccountError::InvalidReferrer(referrer.clone()));
            }
        }

        let email = email.map(str::to_string);
        let account = Account::user(AccountId::generate(), email.clone(), referrer.cloned());
        let account = match (self.registry.insert(account), email) {
            (Ok(account), _) => account,
            (Err(StoreError::Conflict), Some(email)) => {
                return Err(AccountError::EmailAlreadyExists(email));
            }
            (Err(err), _) => return Err(err.into()),
        };
        info!(account = %account.id, "created account");

        let initial_funding = if initial_balance > Decimal::ZERO {
            let request = TransactionRequest::new(
                format!("initial-deposit-{}", account.id),
                format!("Initial deposit for account {}", account.id),
            )
            .debit(self.system.funding_source.clone(), initial_balance)
            .credit(account.id.clone(), initial_balance);

            let transaction_id =
                self.engine
                    .commit(request)
                    .map_err(|source| AccountError::InitialFundingFailed {
                        account: account.id.clone(),
                        source,
                    })?;
            info!(account = %account.id, amount = %initial_balance, "funded new account");
            Some(transaction_id)
        } else {
            None
        };

        let referral = referrer.map(|referrer| self.reward_referrer(referrer, &account.id));

        Ok(CreatedAccount {
            account,
            initial_funding,
            referral,
        })
    }

    fn reward_referrer(&self, referrer: &AccountId, new_account: &AccountId) -> ReferralOutcome {
        let request = TransactionRequest::new(
            format!("referral-reward-{referrer}-{new_account}"),
            format!("Referral reward for referring account {new_account}"),
        )
        .debit(self.system.reward_pool.clone(), self.referral_reward)
        .credit(referrer.clone(), self.referral_reward);

        match self.engine.commit(request) {
            Ok(transaction_id) => {
                info!(
                    referrer = %referrer,
                    amount = %self.referral_reward,
                    %transaction_id,
                    "paid referral reward"
                );
                ReferralOutcome::Rewarded(transaction_id)
            }
            Err(err) => {
                warn!(
                    referrer = %referrer,
                    account = %new_account,
                    error = %err,
                    "referral reward failed; account creation stands"
                );
                ReferralOutcome::Failed(err)
            }
        }
    }

    /// Credits `amount` from the funding source.
    pub fn deposit(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Receipt, AccountError> {
        ensure_positive(Operation::Deposit, amount)?;
        self.ensure_exists(account_id, AccountRole::Account)?;

        let reference_id = format!("deposit-{account_id}-{}", Uuid::new_v4());
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Deposit to account {account_id}"));
        let request = TransactionRequest::new(reference_id.clone(), description)
            .debit(self.system.funding_source.clone(), amount)
            .credit(account_id.clone(), amount);

        let transaction_id = self.engine.commit(request)?;
        let balance = self.balance_after(account_id, transaction_id);
        info!(account = %account_id, %amount, ?balance, "deposit complete");
        Ok(Receipt {
            transaction_id,
            reference_id,
            balance,
        })
    }

    /// Debits `amount` to the funding source, never below a zero balance.
    pub fn withdraw(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Receipt, AccountError> {
        ensure_positive(Operation::Withdrawal, amount)?;
        self.ensure_exists(account_id, AccountRole::Account)?;
        self.ensure_funds(account_id, amount)?;

        let reference_id = format!("withdraw-{account_id}-{}", Uuid::new_v4());
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Withdrawal from account {account_id}"));
        let request = TransactionRequest::new(reference_id.clone(), description)
            .debit(account_id.clone(), amount)
            .credit(self.system.funding_source.clone(), amount)
            .require_non_negative(account_id.clone());

        let transaction_id = self.commit_debit(request, amount)?;
        let balance = self.balance_after(account_id, transaction_id);
        info!(account = %account_id, %amount, ?balance, "withdrawal complete");
        Ok(Receipt {
            transaction_id,
            reference_id,
            balance,
        })
    }

    /// Moves `amount` between two distinct user accounts.
    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Receipt, AccountError> {
        ensure_positive(Operation::Transfer, amount)?;
        if from == to {
            return Err(AccountError::SameAccount(from.clone()));
        }
        self.ensure_exists(from, AccountRole::Source)?;
        self.ensure_exists(to, AccountRole::Destination)?;
        self.ensure_funds(from, amount)?;

        let reference_id = format!("transfer-{from}-{to}-{}", Uuid::new_v4());
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Transfer from {from} to {to}"));
        let request = TransactionRequest::new(reference_id.clone(), description)
            .debit(from.clone(), amount)
            .credit(to.clone(), amount)
            .require_non_negative(from.clone());

        let transaction_id = self.commit_debit(request, amount)?;
        let balance = self.balance_after(from, transaction_id);
        info!(from = %from, to = %to, %amount, ?balance, "transfer complete");
        Ok(Receipt {
            transaction_id,
            reference_id,
            balance,
        })
    }

    pub fn balance(&self, account_id: &AccountId) -> Result<Decimal, AccountError> {
        self.ensure_exists(account_id, AccountRole::Account)?;
        Ok(self.engine.balance(account_id)?)
    }

    pub fn account(&self, account_id: &AccountId) -> Result<AccountSnapshot, AccountError> {
        let account = self
            .registry
            .get(account_id)?
            .ok_or_else(|| AccountError::AccountNotFound {
                role: AccountRole::Account,
                account: account_id.clone(),
            })?;
        let balance = self.engine.balance(account_id)?;
        Ok(AccountSnapshot { account, balance })
    }

    /// Entries of an account, newest first.
    ///
    /// Pages start at 1; page sizes outside `1..=100` fall back to 20.
    pub fn history(
        &self,
        account_id: &AccountId,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, AccountError> {
        self.ensure_exists(account_id, AccountRole::Account)?;

        let page = page.max(1);
        let page_size = if (1..=HistoryPage::MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            HistoryPage::DEFAULT_PAGE_SIZE
        };

        let mut entries = self.engine.entries(account_id)?;
        let total = entries.len();
        entries.reverse();
        let entries = entries
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(HistoryPage {
            entries,
            total,
            page,
            page_size,
        })
    }

    /// Re-reads a balance once `transaction_id` is committed. A failed read
    /// must not turn the committed operation into an error.
    fn balance_after(
        &self,
        account_id: &AccountId,
        transaction_id: TransactionId,
    ) -> Option<Decimal> {
        match self.engine.balance(account_id) {
            Ok(balance) => Some(balance),
            Err(err) => {
                warn!(
                    account = %account_id,
                    %transaction_id,
                    error = %err,
                    "balance read failed after commit"
                );
                None
            }
        }
    }

    /// Commits a request whose only floor-guarded account is debited `amount`.
    fn commit_debit(
        &self,
        request: TransactionRequest,
        amount: Decimal,
    ) -> Result<TransactionId, AccountError> {
        match self.engine.commit(request) {
            Ok(transaction_id) => Ok(transaction_id),
            // A concurrent debit got there first.
            Err(LedgerError::BalanceFloor { account, balance }) => {
                debug!(account = %account, "balance floor hit at commit");
                Err(AccountError::InsufficientBalance {
                    account,
                    available: balance + amount,
                    requested: amount,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn ensure_exists(&self, account_id: &AccountId, role: AccountRole) -> Result<(), AccountError> {
        if self.registry.exists(account_id)? {
            Ok(())
        } else {
            Err(AccountError::AccountNotFound {
                role,
                account: account_id.clone(),
            })
        }
    }

    fn ensure_funds(&self, account_id: &AccountId, amount: Decimal) -> Result<(), AccountError> {
        let available = self.engine.balance(account_id)?;
        if available < amount {
            debug!(account = %account_id, %available, %amount, "insufficient balance");
            return Err(AccountError::InsufficientBalance {
                account: account_id.clone(),
                available,
                requested: amount,
            });
        }
        Ok(())
    }
}

fn ensure_positive(operation: Operation, amount: Decimal) -> Result<(), AccountError> {
    if amount <= Decimal::ZERO {
        return Err(AccountError::NonPositiveAmount { operation, amount });
    }
    Ok(())
}
