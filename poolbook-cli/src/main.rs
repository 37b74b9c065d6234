//! # Poolbook CLI
//!
//! Command-line interface for opening, betting on, resolving and claiming
//! parimutuel settlement markets. The ledger state lives in a JSON snapshot
//! file that every command locks, loads, updates and writes back before it
//! reports anything.

mod state;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use inquire::Confirm;
use poolbook_core::{
    utils::*, AnyResolver, EventKind, FixedClock, Ledger, LedgerBuilder, LedgerConfig,
    LedgerEvent, MarketError, MarketId, MarketView, MemorySink, SingleResolver, SystemClock,
};
use state::{load_ledger, save_ledger, StateLock};

#[derive(Parser)]
#[command(name = "poolbook")]
#[command(about = "Parimutuel market settlement from the command line")]
#[command(version)]
struct Cli {
    /// Ledger state file
    #[arg(long, global = true, default_value = "poolbook.json")]
    state: PathBuf,
    /// Ledger configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Pretend the current time is this Unix timestamp
    #[arg(long, global = true)]
    at: Option<u64>,
    /// Only accept resolutions from this account
    #[arg(long, global = true)]
    authority: Option<String>,
    /// Print JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new market
    Create {
        /// Account opening the market
        #[arg(short, long)]
        creator: String,
        /// Market question
        #[arg(short, long)]
        question: String,
        /// Outcome label (repeat for every option, at least two)
        #[arg(short = 'o', long = "option", required = true)]
        options: Vec<String>,
        /// Betting window, e.g. 3600, 45m, 2h, 7d
        #[arg(short, long)]
        duration: String,
    },
    /// Stake on an option
    Bet {
        /// Market ID
        market_id: MarketId,
        /// Betting account
        #[arg(short, long)]
        bettor: String,
        /// Option index
        #[arg(short, long)]
        option: usize,
        /// Stake amount
        #[arg(short, long)]
        amount: u64,
    },
    /// Declare the winning option
    Resolve {
        /// Market ID
        market_id: MarketId,
        /// Winning option index
        #[arg(short, long)]
        option: usize,
        /// Resolving account
        #[arg(short, long)]
        resolver: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Claim winnings from a resolved market
    Claim {
        /// Market ID
        market_id: MarketId,
        /// Claiming account
        #[arg(short, long)]
        claimant: String,
    },
    /// Show market information
    Show {
        /// Market ID
        market_id: MarketId,
    },
    /// List markets
    List {
        /// Only markets opened by this account
        #[arg(short, long)]
        creator: Option<String>,
    },
    /// Show an account's stakes and claimable payout on a market
    Stake {
        /// Market ID
        market_id: MarketId,
        /// Betting account
        #[arg(short, long)]
        bettor: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let events = Arc::new(MemorySink::new());
    let builder = ledger_builder(&cli, events.clone())?;

    // Held until the command's changes are saved.
    let mut state_lock = StateLock::open(&cli.state)?;
    let _guard = state_lock.acquire()?;
    let ledger = load_ledger(&cli.state, builder).await?;

    let confirm = cli.command.requires_confirmation();
    let mut output = Vec::new();
    let mutated = match cli.command {
        Commands::Create {
            creator,
            question,
            options,
            duration,
        } => {
            let duration = parse_duration(&duration)?;
            let market_id = ledger
                .create_market(&creator, &question, options, duration)
                .map_err(report)
                .context("Failed to create market")?;

            let market = ledger.get_market(market_id)?;
            if cli.json {
                output.push(to_json(&market)?);
            } else {
                output.push("Market Created Successfully!".green().bold().to_string());
                output.extend(market_lines(&market));
                output.push(
                    "Winners will be paid out proportionally after resolution."
                        .bright_blue()
                        .to_string(),
                );
            }
            true
        }

        Commands::Bet {
            market_id,
            bettor,
            option,
            amount,
        } => {
            ledger
                .place_bet(market_id, &bettor, option, amount)
                .map_err(report)
                .with_context(|| format!("Failed to place bet on market {market_id}"))?;
            true
        }

        Commands::Resolve {
            market_id,
            option,
            resolver,
            ..
        } => {
            let market = ledger.get_market(market_id)?;
            let label = market
                .options
                .get(option)
                .cloned()
                .unwrap_or_else(|| format!("#{option}"));

            if confirm {
                let confirmed = Confirm::new(&format!(
                    "Resolve market {market_id} to \"{label}\"? This cannot be undone."
                ))
                .with_default(false)
                .prompt()
                .context("Confirmation prompt failed; pass --yes to resolve non-interactively")?;
                if !confirmed {
                    println!("{}", "Resolution cancelled.".yellow());
                    return Ok(());
                }
            }

            ledger
                .resolve_market(market_id, option, &resolver)
                .map_err(report)
                .with_context(|| format!("Failed to resolve market {market_id}"))?;
            true
        }

        Commands::Claim {
            market_id,
            claimant,
        } => {
            let amount = ledger
                .claim_winnings(market_id, &claimant)
                .map_err(report)
                .with_context(|| format!("Failed to claim from market {market_id}"))?;
            if !cli.json {
                output.push(format!(
                    "{}: {} to {} (disbursement is up to your payment provider)",
                    "Payout".green().bold(),
                    amount.to_string().cyan(),
                    claimant.yellow()
                ));
            }
            true
        }

        Commands::Show { market_id } => {
            let market = ledger.get_market(market_id)?;
            if cli.json {
                output.push(to_json(&market)?);
            } else {
                output.extend(market_lines(&market));
            }
            false
        }

        Commands::List { creator } => {
            let markets = match creator {
                Some(creator) => ledger
                    .get_markets_by_creator(&creator)
                    .into_iter()
                    .map(|id| ledger.get_market(id))
                    .collect::<poolbook_core::Result<Vec<_>>>()?,
                None => ledger.list_markets(),
            };
            if cli.json {
                output.push(to_json(&markets)?);
            } else if markets.is_empty() {
                output.push("No markets yet.".bright_black().to_string());
            } else {
                for market in &markets {
                    output.push(format!(
                        "{} {} [{}] pool {}",
                        format!("#{}", market.id).cyan().bold(),
                        market.question,
                        market.status_summary().yellow(),
                        market.total_pool
                    ));
                }
            }
            false
        }

        Commands::Stake { market_id, bettor } => {
            let market = ledger.get_market(market_id)?;
            let stakes = ledger.get_stakes_of(market_id, &bettor)?;
            let claimable = ledger.preview_payout(market_id, &bettor)?;
            if cli.json {
                output.push(to_json(&serde_json::json!({
                    "market_id": market_id,
                    "bettor": bettor,
                    "stakes": stakes,
                    "claimable": claimable,
                }))?);
            } else {
                output.push(
                    format!("Stakes of {bettor} on market {market_id}")
                        .green()
                        .bold()
                        .to_string(),
                );
                for (index, (label, stake)) in market.options.iter().zip(&stakes).enumerate() {
                    output.push(format!("  [{index}] {label}: {stake}"));
                }
                output.push(format!(
                    "{}: {}",
                    "Claimable".yellow().bold(),
                    claimable.to_string().cyan()
                ));
            }
            false
        }
    };

    // Nothing is reported until the change is durable.
    if mutated {
        save_ledger(&cli.state, &ledger).await?;
    }

    for line in output {
        println!("{line}");
    }
    for event in events.drain() {
        println!("{}", event_line(&event, cli.json)?);
    }

    Ok(())
}

impl Commands {
    /// Whether the command must be confirmed interactively before it runs.
    /// Only `--yes` skips the prompt; output format has no say.
    fn requires_confirmation(&self) -> bool {
        matches!(self, Commands::Resolve { yes: false, .. })
    }
}

/// Assemble the ledger collaborators from the global flags.
fn ledger_builder(cli: &Cli, events: Arc<MemorySink>) -> Result<LedgerBuilder> {
    let config = match &cli.config {
        Some(path) => LedgerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LedgerConfig::default(),
    };

    let mut builder = Ledger::builder().with_config(config).with_events(events);
    builder = match cli.at {
        Some(now) => builder.with_clock(FixedClock::new(now)),
        None => builder.with_clock(SystemClock),
    };
    builder = match &cli.authority {
        Some(account) => builder.with_authority(SingleResolver(account.clone())),
        None => builder.with_authority(AnyResolver),
    };

    Ok(builder)
}

/// Add a hint for errors caused by calling too early or too late.
fn report(error: MarketError) -> anyhow::Error {
    if error.is_timing() {
        eprintln!(
            "{}",
            "Hint: deadlines are checked against the current time; pass --at <unix-ts> to override."
                .bright_black()
        );
    }
    error.into()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn event_line(event: &LedgerEvent, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string(event)?);
    }

    let tag = match event.kind {
        EventKind::MarketCreated { .. } => "created",
        EventKind::BetPlaced { .. } => "bet",
        EventKind::MarketResolved { .. } => "resolved",
        EventKind::WinningsClaimed { .. } => "claimed",
    };
    Ok(format!(
        "{} {} {}",
        format!("[{tag}]").bright_magenta(),
        event.kind,
        format_timestamp(event.at).bright_black()
    ))
}

fn market_lines(market: &MarketView) -> Vec<String> {
    let rule = "═".repeat(50).bright_black().to_string();
    let mut lines = vec![
        rule.clone(),
        format!("{}: {}", "Market ID".yellow().bold(), market.id),
        format!("{}: {}", "Question".yellow().bold(), market.question),
        format!("{}: {}", "Creator".yellow().bold(), market.creator),
        format!("{}: {}", "Deadline".yellow().bold(), format_timestamp(market.deadline)),
        format!(
            "{}: {}",
            "Betting Window".yellow().bold(),
            format_duration(market.deadline.saturating_sub(market.created_at))
        ),
        format!("{}: {}", "Status".yellow().bold(), market.status_summary()),
        format!("{}: {}", "Total Pool".cyan().bold(), market.total_pool),
    ];
    for (index, (label, pool)) in market.options.iter().zip(&market.pool_by_option).enumerate() {
        let odds = market
            .odds(index)
            .map(|odds| format!("{odds:.2}x"))
            .unwrap_or_else(|| "-".to_string());
        let marker = if market.winning_option == Some(index) {
            " ✓".green().bold().to_string()
        } else {
            String::new()
        };
        lines.push(format!("  [{index}] {label}: {pool} ({odds}){marker}"));
    }
    if market.paid_out > 0 {
        lines.push(format!("{}: {}", "Paid Out".cyan().bold(), market.paid_out));
    }
    lines.push(rule);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("poolbook").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_json_output_still_requires_confirmation() {
        let cli = parse(&["--json", "resolve", "1", "-o", "0", "-r", "oracle"]);
        assert!(cli.json);
        assert!(cli.command.requires_confirmation());

        let cli = parse(&["resolve", "1", "-o", "0", "-r", "oracle", "--yes", "--json"]);
        assert!(!cli.command.requires_confirmation());

        let cli = parse(&["resolve", "#1", "--option", "0", "--resolver", "oracle"]);
        assert!(cli.command.requires_confirmation());
    }

    #[test]
    fn test_other_commands_run_unprompted() {
        for args in [
            &["bet", "1", "-b", "alice", "-o", "0", "-a", "100"][..],
            &["claim", "1", "-c", "alice"][..],
            &["show", "1"][..],
            &["list"][..],
        ] {
            assert!(!parse(args).command.requires_confirmation(), "{args:?}");
        }
    }
}
