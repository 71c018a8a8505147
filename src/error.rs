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

//! Error types for the ledger engine, the persistence layer and wallet operations.

use crate::base::AccountId;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or rule-breaking input, detected before any write.
    Validation,
    /// A referenced account does not exist.
    NotFound,
    /// A business rule rejected the operation (e.g. insufficient balance).
    Conflict,
    /// The store failed; the operation had no effect and may be retried.
    Infrastructure,
}

/// Persistence failures.
///
/// Messages are deliberately generic so storage details never reach callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable")]
    Unavailable,

    #[error("commit failed")]
    CommitFailed,

    /// A unique key was already taken.
    #[error("record already exists")]
    Conflict,

    /// A balance would leave the representable decimal range.
    #[error("balance out of range")]
    Overflow,

    /// Failure raised by fault injection.
    #[error("storage fault")]
    Fault,
}

/// Ledger transaction engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Fewer than two entries, or debit total differs from credit total.
    #[error("unbalanced transaction: debits ({debits}) must equal credits ({credits})")]
    UnbalancedTransaction { debits: Decimal, credits: Decimal },

    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// Monetary text that is not an exact decimal.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// Amounts or a resulting balance exceed the representable decimal range.
    #[error("amount overflow")]
    AmountOverflow,

    #[error("negative magnitude {amount} for account {account}")]
    NegativeMagnitude { account: AccountId, amount: Decimal },

    /// A floor-guarded account would end the transaction below zero.
    #[error("balance of account {account} would drop to {balance}")]
    BalanceFloor { account: AccountId, balance: Decimal },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::UnbalancedTransaction { .. }
            | LedgerError::InvalidDirection(_)
            | LedgerError::InvalidAmount(_)
            | LedgerError::AmountOverflow
            | LedgerError::NegativeMagnitude { .. } => ErrorKind::Validation,
            LedgerError::BalanceFloor { .. } => ErrorKind::Conflict,
            LedgerError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

/// The wallet operation that rejected a non-positive amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdrawal,
    Transfer,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Deposit => "deposit",
            Operation::Withdrawal => "withdrawal",
            Operation::Transfer => "transfer",
        })
    }
}

/// Which side of an operation referenced a missing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    Account,
    Source,
    Destination,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccountRole::Account => "account",
            AccountRole::Source => "source account",
            AccountRole::Destination => "destination account",
        })
    }
}

/// Wallet operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("{operation} amount must be positive, got {amount}")]
    NonPositiveAmount { operation: Operation, amount: Decimal },

    #[error("initial balance cannot be negative, got {0}")]
    NegativeInitialBalance(Decimal),

    #[error("cannot transfer to the same account {0}")]
    SameAccount(AccountId),

    #[error("{role} not found: {account}")]
    AccountNotFound { role: AccountRole, account: AccountId },

    #[error("invalid referrer: {0}")]
    InvalidReferrer(AccountId),

    #[error("email already exists: {0}")]
    EmailAlreadyExists(String),

    #[error("insufficient balance in {account}: have {available}, need {requested}")]
    InsufficientBalance {
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    /// The account was created but its opening balance could not be posted.
    #[error("account {account} created but initial funding failed: {source}")]
    InitialFundingFailed {
        account: AccountId,
        source: LedgerError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccountError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::NonPositiveAmount { .. }
            | AccountError::NegativeInitialBalance(_)
            | AccountError::SameAccount(_)
            | AccountError::InvalidReferrer(_) => ErrorKind::Validation,
            AccountError::AccountNotFound { .. } => ErrorKind::NotFound,
            AccountError::EmailAlreadyExists(_) | AccountError::InsufficientBalance { .. } => {
                ErrorKind::Conflict
            }
            AccountError::InitialFundingFailed { source, .. } => source.kind(),
            AccountError::Ledger(err) => err.kind(),
            AccountError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Only infrastructure failures are worth retrying; nothing was written.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}
