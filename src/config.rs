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

//! Wallet configuration.

use crate::base::{AccountId, parse_amount};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Designated accounts through which value enters and leaves the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemAccounts {
    /// Counterparty of deposits, withdrawals and opening balances.
    pub funding_source: AccountId,
    pub disbursement: AccountId,
    /// Pays out referral rewards.
    pub reward_pool: AccountId,
}

impl SystemAccounts {
    pub fn all(&self) -> [&AccountId; 3] {
        [&self.funding_source, &self.disbursement, &self.reward_pool]
    }
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self {
            funding_source: AccountId::from("1004"),
            disbursement: AccountId::from("1003"),
            reward_pool: AccountId::from("1001"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub system_accounts: SystemAccounts,
    /// Paid to the referrer when a referred account is opened.
    pub referral_reward: Decimal,
    pub log: LogConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            system_accounts: SystemAccounts::default(),
            referral_reward: dec!(10.00),
            log: LogConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Load from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        if config.referral_reward < Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "referral_reward",
                value: config.referral_reward.to_string(),
            });
        }
        Ok(config)
    }

    /// Load defaults overlaid with `WALLET_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("WALLET_FUNDING_ACCOUNT") {
            self.system_accounts.funding_source = id.into();
        }
        if let Some(id) = lookup("WALLET_DISBURSEMENT_ACCOUNT") {
            self.system_accounts.disbursement = id.into();
        }
        if let Some(id) = lookup("WALLET_REWARD_POOL_ACCOUNT") {
            self.system_accounts.reward_pool = id.into();
        }
        if let Some(value) = lookup("WALLET_REFERRAL_REWARD") {
            self.referral_reward = match parse_amount(&value) {
                Ok(amount) if amount >= Decimal::ZERO => amount,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "WALLET_REFERRAL_REWARD",
                        value,
                    });
                }
            };
        }
        if let Some(level) = lookup("WALLET_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(value) = lookup("WALLET_LOG_JSON") {
            self.log.json = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "WALLET_LOG_JSON",
                value,
            })?;
        }
        Ok(self)
    }
}
