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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use wallet_ledger::{
    AccountError, AccountId, AccountRegistry, Engine, LedgerError, LedgerStore, MemoryRegistry,
    MemoryStore, Wallet, WalletConfig, parse_amount, telemetry,
};

/// Wallet Ledger - Replay wallet operations from a CSV file
///
/// Reads operations from a CSV file and outputs the resulting balances to stdout.
/// Supports opening accounts (with optional funding and referrer), deposits,
/// withdrawals and transfers.
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "A double-entry wallet that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,account,counterparty,amount,email
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// TOML configuration file; defaults and WALLET_* variables are used otherwise
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => WalletConfig::from_file(path),
        None => WalletConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };
    telemetry::init(&config.log);

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open input");
            process::exit(1);
        }
    };

    let wallet = Wallet::new(
        Engine::new(Arc::new(MemoryStore::new())),
        Arc::new(MemoryRegistry::new()),
        &config,
    );
    if let Err(e) = wallet.bootstrap() {
        error!(error = %e, "cannot register system accounts");
        process::exit(1);
    }

    let aliases = match process_operations(&wallet, BufReader::new(file)) {
        Ok(aliases) => aliases,
        Err(e) => {
            error!(error = %e, "cannot process operations");
            process::exit(1);
        }
    };

    if let Err(e) = write_balances(&wallet, &aliases, std::io::stdout()) {
        error!(error = %e, "cannot write output");
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, account, counterparty, amount, email`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    account: String,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Why a single row was skipped.
#[derive(Error, Debug)]
enum RowError {
    #[error("unknown operation {0:?}")]
    UnknownOperation(String),

    #[error("unknown account alias {0:?}")]
    UnknownAlias(String),

    #[error("alias {0:?} is already open")]
    AliasTaken(String),

    #[error("missing amount")]
    MissingAmount,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Account(#[from] AccountError),
}

/// Alias-to-account bindings made by `open` rows.
type Aliases = BTreeMap<String, AccountId>;

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

fn resolve(aliases: &Aliases, alias: &str) -> Result<AccountId, RowError> {
    aliases
        .get(alias)
        .cloned()
        .ok_or_else(|| RowError::UnknownAlias(alias.to_string()))
}

fn required_amount(amount: Option<String>) -> Result<Decimal, RowError> {
    let text = non_empty(amount).ok_or(RowError::MissingAmount)?;
    Ok(parse_amount(&text)?)
}

fn apply<S, R>(
    wallet: &Wallet<S, R>,
    aliases: &mut Aliases,
    record: CsvRecord,
) -> Result<(), RowError>
where
    S: LedgerStore,
    R: AccountRegistry,
{
    let counterparty = non_empty(record.counterparty);

    match record.op.to_lowercase().as_str() {
        "open" => {
            if aliases.contains_key(&record.account) {
                return Err(RowError::AliasTaken(record.account));
            }
            let initial = match non_empty(record.amount) {
                Some(text) => parse_amount(&text)?,
                None => Decimal::ZERO,
            };
            let referrer = counterparty
                .map(|alias| resolve(aliases, &alias))
                .transpose()?;
            let email = non_empty(record.email);

            let result = wallet.create_account(email.as_deref(), initial, referrer.as_ref());
            let created = match result {
                Ok(created) => created,
                // The account exists unfunded; keep it reachable.
                Err(AccountError::InitialFundingFailed { account, source }) => {
                    aliases.insert(record.account, account.clone());
                    return Err(AccountError::InitialFundingFailed { account, source }.into());
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(wallet_ledger::ReferralOutcome::Failed(e)) = &created.referral {
                warn!(alias = %record.account, error = %e, "referral reward not paid");
            }
            aliases.insert(record.account, created.account.id);
        }
        "deposit" => {
            let account = resolve(aliases, &record.account)?;
            wallet.deposit(&account, required_amount(record.amount)?, None)?;
        }
        "withdraw" | "withdrawal" => {
            let account = resolve(aliases, &record.account)?;
            wallet.withdraw(&account, required_amount(record.amount)?, None)?;
        }
        "transfer" => {
            let from = resolve(aliases, &record.account)?;
            let to = resolve(aliases, counterparty.as_deref().unwrap_or_default())?;
            wallet.transfer(&from, &to, required_amount(record.amount)?, None)?;
        }
        other => return Err(RowError::UnknownOperation(other.to_string())),
    }
    Ok(())
}

/// Replay operations from a CSV reader.
///
/// Rows are streamed, so arbitrarily large files are fine. Malformed and
/// rejected rows are logged and skipped; processing continues.
///
/// # CSV Format
///
/// Expected columns: `op, account, counterparty, amount, email`
/// - `op`: open, deposit, withdraw, transfer
/// - `account`: caller-chosen alias, bound to a generated account by `open`
/// - `counterparty`: referrer alias for `open`, destination alias for `transfer`
/// - `amount`: exact decimal (optional opening balance for `open`)
/// - `email`: optional, `open` only
///
/// # Example
///
/// ```csv
/// op,account,counterparty,amount,email
/// open,alice,,100.00,alice@example.com
/// open,bob,alice,,bob@example.com
/// transfer,alice,bob,30.00,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn process_operations<S, R, I>(wallet: &Wallet<S, R>, reader: I) -> Result<Aliases, csv::Error>
where
    S: LedgerStore,
    R: AccountRegistry,
    I: Read,
{
    let mut aliases = Aliases::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = line + 2;
        match result {
            Ok(record) => {
                if let Err(e) = apply(wallet, &mut aliases, record) {
                    warn!(row, error = %e, "skipping rejected operation");
                }
            }
            Err(e) => {
                warn!(row, error = %e, "skipping malformed row");
            }
        }
    }

    info!(accounts = aliases.len(), "replay finished");
    Ok(aliases)
}

#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    alias: &'a str,
    account: &'a AccountId,
    balance: Decimal,
}

/// Write one `alias,account,balance` row per opened account, ordered by alias.
fn write_balances<S, R, W>(
    wallet: &Wallet<S, R>,
    aliases: &Aliases,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: LedgerStore,
    R: AccountRegistry,
    W: Write,
{
    let mut wtr = Writer::from_writer(writer);

    for (alias, account) in aliases {
        wtr.serialize(BalanceRow {
            alias,
            account,
            balance: wallet.balance(account)?,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wallet_ledger::Fault;
    use std::io::Cursor;

    fn wallet() -> Wallet<MemoryStore, MemoryRegistry> {
        let wallet = Wallet::new(
            Engine::new(Arc::new(MemoryStore::new())),
            Arc::new(MemoryRegistry::new()),
            &WalletConfig::default(),
        );
        wallet.bootstrap().unwrap();
        wallet
    }

    fn balance_of(wallet: &Wallet<MemoryStore, MemoryRegistry>, aliases: &Aliases, alias: &str) -> Decimal {
        wallet.balance(&aliases[alias]).unwrap()
    }

    #[test]
    fn open_and_deposit() {
        let csv = "op,account,counterparty,amount,email\n\
                   open,alice,,,alice@example.com\n\
                   deposit,alice,,50.00,\n";
        let wallet = wallet();

        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        assert_eq!(aliases.len(), 1);
        assert_eq!(balance_of(&wallet, &aliases, "alice"), dec!(50.00));
    }

    #[test]
    fn transfer_between_aliases() {
        let csv = "op,account,counterparty,amount,email\n\
                   open,alice,,100.00,\n\
                   open,bob,,,\n\
                   transfer,alice,bob,30.00,\n";
        let wallet = wallet();

        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        assert_eq!(balance_of(&wallet, &aliases, "alice"), dec!(70.00));
        assert_eq!(balance_of(&wallet, &aliases, "bob"), dec!(30.00));
    }

    #[test]
    fn referral_pays_referrer() {
        let csv = "op,account,counterparty,amount,email\n\
                   open,alice,,,\n\
                   open,bob,alice,,\n";
        let wallet = wallet();

        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        assert_eq!(balance_of(&wallet, &aliases, "alice"), dec!(10.00));
        assert_eq!(balance_of(&wallet, &aliases, "bob"), dec!(0));
    }

    #[test]
    fn rejected_rows_are_skipped() {
        let csv = "op,account,counterparty,amount,email\n\
                   open,alice,,10.00,\n\
                   withdraw,alice,,20.00,\n\
                   deposit,ghost,,5.00,\n\
                   deposit,alice,,abc,\n\
                   refund,alice,,1.00,\n\
                   open,alice,,,\n\
                   deposit,alice,,1.50,\n";
        let wallet = wallet();

        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        assert_eq!(aliases.len(), 1);
        assert_eq!(balance_of(&wallet, &aliases, "alice"), dec!(11.50));
    }

    #[test]
    fn unfunded_open_still_binds_alias() {
        let csv = "op,account,counterparty,amount,email\n\
                   open,alice,,10.00,\n\
                   deposit,alice,,4.00,\n";
        let wallet = wallet();
        wallet.engine().store().inject_fault(Fault::Commit);

        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        assert_eq!(aliases.len(), 1);
        assert_eq!(balance_of(&wallet, &aliases, "alice"), dec!(4.00));
    }

    #[test]
    fn whitespace_is_trimmed() {
        let csv = "op,account,counterparty,amount,email\n open , alice , , 7.25 , \n";
        let wallet = wallet();

        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        assert_eq!(balance_of(&wallet, &aliases, "alice"), dec!(7.25));
    }

    #[test]
    fn write_balances_to_csv() {
        let csv = "op,account,counterparty,amount,email\n\
                   open,bob,,2.50,\n\
                   open,alice,,1.00,\n";
        let wallet = wallet();
        let aliases = process_operations(&wallet, Cursor::new(csv)).unwrap();

        let mut output = Vec::new();
        write_balances(&wallet, &aliases, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "alias,account,balance");
        assert!(lines[1].starts_with("alice,") && lines[1].ends_with(",1.00"));
        assert!(lines[2].starts_with("bob,") && lines[2].ends_with(",2.50"));
    }
}
