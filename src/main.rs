// splitledger CLI - drives the wallet service from the command line
// Stands in for the conversational front end: one invocation per action.

use clap::{Parser, Subcommand};
use splitledger::ledger::LedgerError;
use splitledger::money::Money;
use splitledger::service::WalletService;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splitledger", version, about = "Shared wallet ledger with debt settlement")]
struct Cli {
    /// Directory holding the ledger database
    #[arg(long, default_value = "./splitledger-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a wallet owned by a member
    CreateWallet {
        /// Wallet name
        name: String,
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        owner_name: String,
    },
    /// List wallets a member owns or has joined
    Wallets {
        #[arg(long)]
        member: i64,
    },
    /// Request membership in a wallet
    Join {
        #[arg(long)]
        wallet: u64,
        #[arg(long)]
        member: i64,
        #[arg(long)]
        name: String,
    },
    /// Accept a pending membership request (owner only)
    Accept {
        #[arg(long)]
        wallet: u64,
        #[arg(long)]
        requester: i64,
        #[arg(long)]
        owner: i64,
    },
    /// Decline a pending membership request (owner only)
    Decline {
        #[arg(long)]
        wallet: u64,
        #[arg(long)]
        requester: i64,
        #[arg(long)]
        owner: i64,
    },
    /// Record a contribution
    Contribute {
        /// Amount, e.g. 12.50
        amount: Money,
        #[arg(long)]
        wallet: u64,
        #[arg(long)]
        member: i64,
        #[arg(long)]
        note: Option<String>,
    },
    /// Record an expense
    Spend {
        /// Amount, e.g. 12.50
        amount: Money,
        #[arg(long)]
        wallet: u64,
        #[arg(long)]
        member: i64,
        #[arg(long)]
        category: String,
        #[arg(long)]
        destination: String,
        /// Attribute the cost to all members instead of the spender
        #[arg(long)]
        shared: bool,
    },
    /// Delete a contribution (original contributor only)
    DeleteContribution {
        #[arg(long)]
        event: u64,
        #[arg(long)]
        member: i64,
    },
    /// Delete an expense (original spender only)
    DeleteExpense {
        #[arg(long)]
        event: u64,
        #[arg(long)]
        member: i64,
    },
    /// Show the current balance
    Balance {
        #[arg(long)]
        wallet: u64,
    },
    /// Show totals and the per-category breakdown
    Stats {
        #[arg(long)]
        wallet: u64,
    },
    /// Show net positions and who pays whom
    Settle {
        #[arg(long)]
        wallet: u64,
    },
    /// Delete a wallet and all its history (owner only)
    DeleteWallet {
        #[arg(long)]
        wallet: u64,
        #[arg(long)]
        owner: i64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), LedgerError> {
    let service = WalletService::open(&cli.data_dir).map_err(LedgerError::Unavailable)?;

    match cli.command {
        Command::CreateWallet {
            name,
            owner,
            owner_name,
        } => {
            service.register_member(owner, &owner_name)?;
            let wallet = service.create_wallet(owner, &name)?;
            println!("created wallet #{} \"{}\"", wallet.id, wallet.name);
        }
        Command::Wallets { member } => {
            let wallets = service.wallets_for_member(member)?;
            if wallets.is_empty() {
                println!("no wallets");
            }
            for wallet in wallets {
                println!(
                    "#{} \"{}\" balance {} (owner {})",
                    wallet.id, wallet.name, wallet.balance, wallet.owner_id
                );
            }
        }
        Command::Join {
            wallet,
            member,
            name,
        } => {
            service.register_member(member, &name)?;
            service.request_membership(wallet, member)?;
            println!("request pending, waiting for the owner's decision");
        }
        Command::Accept {
            wallet,
            requester,
            owner,
        } => {
            service.accept_membership(wallet, requester, owner)?;
            println!("member {requester} added to wallet #{wallet}");
        }
        Command::Decline {
            wallet,
            requester,
            owner,
        } => {
            service.decline_membership(wallet, requester, owner)?;
            println!("request from {requester} declined");
        }
        Command::Contribute {
            amount,
            wallet,
            member,
            note,
        } => {
            let (event, balance) =
                service.record_contribution(wallet, member, amount, note.as_deref())?;
            println!(
                "contribution #{} of {} recorded, new balance {}",
                event.id, event.amount, balance
            );
        }
        Command::Spend {
            amount,
            wallet,
            member,
            category,
            destination,
            shared,
        } => {
            let (event, balance) =
                service.record_expense(wallet, member, &category, &destination, amount, shared)?;
            let kind = if event.is_shared { "shared" } else { "personal" };
            println!(
                "expense #{} of {} ({}, {}) recorded, new balance {}",
                event.id, event.amount, event.category, kind, balance
            );
        }
        Command::DeleteContribution { event, member } => {
            let balance = service.delete_contribution(event, member)?;
            println!("contribution #{event} deleted, balance restored to {balance}");
        }
        Command::DeleteExpense { event, member } => {
            let balance = service.delete_expense(event, member)?;
            println!("expense #{event} deleted, balance restored to {balance}");
        }
        Command::Balance { wallet } => {
            println!("{}", service.current_balance(wallet)?);
        }
        Command::Stats { wallet } => {
            let stats = service.statistics(wallet)?;
            println!("balance:             {}", stats.balance);
            println!("total contributions: {}", stats.total_contributions);
            println!("total expenses:      {}", stats.total_expenses);
            if !stats.by_category.is_empty() {
                println!("by category:");
                for entry in &stats.by_category {
                    // percentage is display-only; ledger arithmetic stays integral
                    let percent = if stats.total_expenses.is_zero() {
                        0.0
                    } else {
                        entry.total.cents() as f64 / stats.total_expenses.cents() as f64 * 100.0
                    };
                    println!("  {}: {} ({percent:.1}%)", entry.category, entry.total);
                }
            }
        }
        Command::Settle { wallet } => {
            let plan = service.settlement_plan(wallet)?;
            println!("net positions:");
            for position in &plan.positions {
                let standing = if position.net.is_positive() {
                    format!("is owed {}", position.net)
                } else if position.net.is_negative() {
                    format!("owes {}", position.net.abs())
                } else {
                    "settled".to_string()
                };
                println!(
                    "  {} (id {}): paid {}, spent {} -> {}",
                    position.name, position.member_id, position.paid, position.spent, standing
                );
            }
            if plan.transfers.is_empty() {
                println!("no transfers needed");
            } else {
                println!("transfers:");
                for transfer in &plan.transfers {
                    println!("  {} -> {}: {}", transfer.from, transfer.to, transfer.amount);
                }
            }
        }
        Command::DeleteWallet { wallet, owner } => {
            service.delete_wallet(wallet, owner)?;
            println!("wallet #{wallet} deleted");
        }
    }

    Ok(())
}
