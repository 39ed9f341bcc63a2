use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::{BankService, Page, TransferRequest};
use crate::config::{OverdraftPolicy, StoreConfig};
use crate::domain::{Account, AccountId, Entry, Transfer, format_cents, parse_cents};
use crate::storage::{AfterCreate, CreateUserParams, SqliteStore, TransferTxResult};

/// bank-ledger - double-entry money transfers between accounts
#[derive(Parser)]
#[command(name = "bank-ledger")]
#[command(about = "Accounts, entries and atomic transfers on a SQLite ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "BANK_DATABASE", default_value = "bank.db")]
    pub database: String,

    /// Maximum pooled connections
    #[arg(long, env = "BANK_MAX_CONNECTIONS", default_value_t = StoreConfig::DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// How long a statement waits for a lock, in milliseconds
    #[arg(long, env = "BANK_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Upper bound on one unit of work, in milliseconds
    #[arg(long, env = "BANK_TX_TIMEOUT_MS", default_value_t = 30_000)]
    pub tx_timeout_ms: u64,

    /// Refuse transfers that would leave the source account negative
    #[arg(long, env = "BANK_REJECT_OVERDRAFT")]
    pub reject_overdraft: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Move money between two accounts
    Transfer {
        /// Source account ID
        from: AccountId,

        /// Destination account ID
        to: AccountId,

        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Currency both accounts hold
        #[arg(short, long, default_value = "USD")]
        currency: String,

        /// Act as this user; the source account must belong to them
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show row counts and the sum of all entries
    Stats,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Create {
        username: String,

        #[arg(long)]
        full_name: String,

        #[arg(long)]
        email: String,

        /// Password hash to store
        #[arg(long)]
        password_hash: String,
    },

    /// Show a user
    Show { username: String },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open an account with a zero balance
    Create {
        /// Owning username
        owner: String,

        /// Currency code: USD, CAD or EUR
        #[arg(short, long, default_value = "USD")]
        currency: String,
    },

    /// Show one account
    Show {
        id: AccountId,

        /// Only show it if it belongs to this user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List a user's accounts
    List {
        owner: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// List an account's entries
    Entries {
        id: AccountId,

        #[command(flatten)]
        page: PageArgs,
    },

    /// List transfers in or out of an account
    Transfers {
        id: AccountId,

        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(clap::Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: i64,

    /// Rows per page (5 to 10)
    #[arg(long, default_value_t = Page::MIN_SIZE)]
    pub page_size: i64,
}

impl PageArgs {
    fn to_page(&self) -> Result<Page> {
        Ok(Page::new(self.page, self.page_size)?)
    }
}

impl Cli {
    pub fn store_config(&self) -> StoreConfig {
        let policy = if self.reject_overdraft {
            OverdraftPolicy::Reject
        } else {
            OverdraftPolicy::Allow
        };
        StoreConfig::for_path(&self.database)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .with_tx_timeout(Duration::from_millis(self.tx_timeout_ms))
            .with_overdraft_policy(policy)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();

        let store = match self.command {
            Commands::Init => {
                let store = SqliteStore::init(config).await?;
                println!("Database initialized: {}", self.database);
                store
            }
            _ => SqliteStore::connect(config)
                .await
                .with_context(|| format!("Cannot open {}. Run `init` first?", self.database))?,
        };

        // Ctrl-C cancels whatever unit of work is in flight
        let cancel = CancellationToken::new();
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                watcher.cancel();
            }
        });

        let service = BankService::new(Arc::new(store.clone()));
        let output = Output { json: self.json };
        let result = run_command(&service, self.command, &output, &cancel).await;

        store.close().await;
        result
    }
}

async fn run_command(
    service: &BankService,
    command: Commands,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        // Schema is applied when the store opens
        Commands::Init => Ok(()),

        Commands::User(cmd) => run_user_command(service, cmd, output, cancel).await,

        Commands::Account(cmd) => run_account_command(service, cmd, output).await,

        Commands::Transfer {
            from,
            to,
            amount,
            currency,
            user,
        } => {
            let amount = parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let result = service
                .transfer(
                    TransferRequest {
                        from_account_id: from,
                        to_account_id: to,
                        amount,
                        currency,
                        acting_user: user,
                    },
                    cancel,
                )
                .await?;
            output.transfer_result(&result)
        }

        Commands::Stats => {
            let stats = service.ledger_stats().await?;
            if output.json {
                return output.print_json(&stats);
            }
            println!("Users:     {}", stats.users);
            println!("Accounts:  {}", stats.accounts);
            println!("Transfers: {}", stats.transfers);
            println!("Entries:   {}", stats.entries);
            println!("Net entry total: {}", format_cents(stats.entry_total));
            Ok(())
        }
    }
}

async fn run_user_command(
    service: &BankService,
    cmd: UserCommands,
    output: &Output,
    cancel: &CancellationToken,
) -> Result<()> {
    match cmd {
        UserCommands::Create {
            username,
            full_name,
            email,
            password_hash,
        } => {
            let after_create: AfterCreate = Box::new(|user| {
                Box::pin(async move {
                    info!(username = %user.username, email = %user.email, "user registered");
                    Ok(())
                })
            });
            let user = service
                .create_user(
                    CreateUserParams {
                        username,
                        hashed_password: password_hash,
                        full_name,
                        email,
                    },
                    after_create,
                    cancel,
                )
                .await?;

            if output.json {
                return output.print_json(&user);
            }
            println!("Created user: {} <{}>", user.username, user.email);
        }

        UserCommands::Show { username } => {
            let user = service.get_user(&username).await?;
            if output.json {
                return output.print_json(&user);
            }
            println!("Username:  {}", user.username);
            println!("Full name: {}", user.full_name);
            println!("Email:     {}", user.email);
            println!("Created:   {}", user.created_at.format("%Y-%m-%d %H:%M"));
        }
    }
    Ok(())
}

async fn run_account_command(
    service: &BankService,
    cmd: AccountCommands,
    output: &Output,
) -> Result<()> {
    match cmd {
        AccountCommands::Create { owner, currency } => {
            let account = service.create_account(&owner, &currency).await?;
            if output.json {
                return output.print_json(&account);
            }
            println!(
                "Created account {} for {} ({})",
                account.id, account.owner, account.currency
            );
        }

        AccountCommands::Show { id, user } => {
            let account = service.get_account(id, user.as_deref()).await?;
            if output.json {
                return output.print_json(&account);
            }
            print_accounts(&[account]);
        }

        AccountCommands::List { owner, page } => {
            let accounts = service.list_accounts(&owner, page.to_page()?).await?;
            if output.json {
                return output.print_json(&accounts);
            }
            if accounts.is_empty() {
                println!("No accounts found for {}.", owner);
            } else {
                print_accounts(&accounts);
            }
        }

        AccountCommands::Entries { id, page } => {
            let entries = service.account_entries(id, page.to_page()?).await?;
            if output.json {
                return output.print_json(&entries);
            }
            print_entries(&entries);
        }

        AccountCommands::Transfers { id, page } => {
            let transfers = service.account_transfers(id, page.to_page()?).await?;
            if output.json {
                return output.print_json(&transfers);
            }
            print_transfers(id, &transfers);
        }
    }
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn transfer_result(&self, result: &TransferTxResult) -> Result<()> {
        if self.json {
            return self.print_json(result);
        }
        println!(
            "Transfer {}: {} {} -> {}",
            result.transfer.id,
            format_cents(result.transfer.amount),
            result.from_account.id,
            result.to_account.id
        );
        println!(
            "  account {} balance: {}",
            result.from_account.id,
            format_cents(result.from_account.balance)
        );
        println!(
            "  account {} balance: {}",
            result.to_account.id,
            format_cents(result.to_account.balance)
        );
        Ok(())
    }
}

fn print_accounts(accounts: &[Account]) {
    println!("{:<8} {:<20} {:>14} {:<4}", "ID", "Owner", "Balance", "Cur");
    println!("{}", "-".repeat(49));
    for account in accounts {
        let marker = if account.is_overdrawn() { " !" } else { "" };
        println!(
            "{:<8} {:<20} {:>14} {:<4}{}",
            account.id,
            account.owner,
            format_cents(account.balance),
            account.currency,
            marker
        );
    }
}

fn print_entries(entries: &[Entry]) {
    if entries.is_empty() {
        println!("No entries found.");
        return;
    }
    println!("{:<8} {:>14} {:<17}", "ID", "Amount", "Date");
    println!("{}", "-".repeat(41));
    for entry in entries {
        println!(
            "{:<8} {:>14} {:<17}",
            entry.id,
            format_cents(entry.amount),
            entry.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn print_transfers(account_id: AccountId, transfers: &[Transfer]) {
    if transfers.is_empty() {
        println!("No transfers found.");
        return;
    }
    println!("{:<8} {:<4} {:<8} {:>14} {:<17}", "ID", "Dir", "Other", "Amount", "Date");
    println!("{}", "-".repeat(55));
    for transfer in transfers {
        let (direction, other) = if transfer.from_account_id == account_id {
            ("out", transfer.to_account_id)
        } else {
            ("in", transfer.from_account_id)
        };
        println!(
            "{:<8} {:<4} {:<8} {:>14} {:<17}",
            transfer.id,
            direction,
            other,
            format_cents(transfer.amount),
            transfer.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}
