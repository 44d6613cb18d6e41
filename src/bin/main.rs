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

use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use gobank_core::config::SECRET_VAR;
use gobank_core::{
    AccountId, Config, Error, Identity, InMemoryStore, LedgerConfig, Role, TokenCodec,
    TransferCoordinator,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// GoBank ledger tool - issue and check session tokens, replay ledger commands
#[derive(Parser, Debug)]
#[command(name = "gobank")]
#[command(about = "Session tokens and ledger replay for the GoBank core", long_about = None)]
struct Args {
    /// Token signing secret (falls back to GOBANK_TOKEN_SECRET)
    #[arg(long, global = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue or verify session tokens
    #[command(subcommand)]
    Token(TokenCommand),

    /// Run a CSV of ledger commands and print final balances
    ///
    /// Expected format: type,account,counterparty,amount,description
    /// Example: cargo run -- replay commands.csv > balances.csv
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    Issue {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    Verify {
        token: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Token(command) => run_token(command, args.secret),
        Command::Replay { input } => run_replay(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_token(command: TokenCommand, secret: Option<String>) -> Result<(), String> {
    let config = match secret {
        Some(secret) => Config::from_lookup(|key| {
            if key == SECRET_VAR {
                Some(secret.clone())
            } else {
                std::env::var(key).ok()
            }
        }),
        None => Config::from_env(),
    }
    .map_err(|e| e.to_string())?;
    let codec = TokenCodec::from_config(&config.token).map_err(|e| e.to_string())?;

    match command {
        TokenCommand::Issue { subject, role } => {
            let token = codec.generate(&subject, role).map_err(|e| e.to_string())?;
            println!("{token}");
        }
        TokenCommand::Verify { token } => match codec.verify(&token) {
            Ok(claim) => {
                let json = serde_json::to_string_pretty(&claim).map_err(|e| e.to_string())?;
                println!("{json}");
            }
            Err(e) => return Err(Error::from(e).user_message().to_owned()),
        },
    }
    Ok(())
}

fn run_replay(input: &Path) -> Result<(), String> {
    let file = File::open(input)
        .map_err(|e| format!("opening file '{}': {}", input.display(), e))?;
    let ledger_config = LedgerConfig::from_lookup(|key| std::env::var(key).ok())
        .map_err(|e| e.to_string())?;
    let store = Arc::new(InMemoryStore::new(&ledger_config));
    let coordinator = TransferCoordinator::new(store.clone(), &ledger_config);

    let applied = replay_commands(&coordinator, BufReader::new(file))
        .map_err(|e| format!("processing commands: {e}"))?;
    info!(applied, "replay finished");

    write_balances(&store, std::io::stdout()).map_err(|e| format!("writing output: {e}"))
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, account, counterparty, amount, description`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    command: String,
    account: String,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    description: Option<String>,
}

/// Runs ledger commands from a CSV reader through `coordinator`.
///
/// Commands act as the user owning `account`:
/// - `open`: register `account` with an opening balance of `amount` (default 0)
/// - `topup`, `withdraw`: credit or debit `account` by `amount`
/// - `transfer`: move `amount` from `account` to `counterparty`
///
/// Malformed rows and rejected commands are logged and skipped.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn replay_commands<R: Read>(coordinator: &TransferCoordinator, reader: R) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0;
    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "skipping malformed row");
                continue;
            }
        };
        match apply(coordinator, record) {
            Ok(()) => applied += 1,
            Err(e) => warn!(line, error = %e, "skipping rejected command"),
        }
    }
    Ok(applied)
}

fn apply(coordinator: &TransferCoordinator, record: CsvRecord) -> Result<(), String> {
    let account = AccountId(record.account);
    let identity = Identity::User(account.clone());
    let amount = || record.amount.ok_or_else(|| "missing amount".to_owned());

    match record.command.to_lowercase().as_str() {
        "open" => coordinator
            .register(account, Role::User, record.amount.unwrap_or(Decimal::ZERO))
            .map(|_| ()),
        "topup" => coordinator.top_up(&identity, amount()?).map(|_| ()),
        "withdraw" => coordinator.withdraw(&identity, amount()?).map(|_| ()),
        "transfer" => {
            let credit = record
                .counterparty
                .clone()
                .map(AccountId)
                .ok_or_else(|| "missing counterparty".to_owned())?;
            coordinator
                .transfer_as(
                    &identity,
                    &credit,
                    amount()?,
                    record.description.clone().unwrap_or_default(),
                )
                .map(|_| ())
        }
        other => return Err(format!("unknown command '{other}'")),
    }
    .map_err(|e: Error| e.to_string())
}

/// Writes every account as CSV with 4 decimal precision.
///
/// Columns: `account, role, balance`
fn write_balances<W: Write>(store: &InMemoryStore, writer: W) -> Result<(), String> {
    let mut wtr = Writer::from_writer(writer);
    for account in store.accounts().map_err(|e| e.to_string())? {
        wtr.serialize(&account).map_err(|e| e.to_string())?;
    }
    wtr.flush().map_err(|e| e.to_string())
}
