//! Rebalancing Trade Bot
//!
//! Holds each configured coin position near a target value on the MAX
//! exchange, with operator approval over Telegram for risky trades and an
//! automatic take-profit exit.

mod api;
mod bot;
mod db;
mod error;
mod metrics;
mod models;
mod trading;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::bot::{Bot, BotConfig};
use crate::models::{StrategyConfig, DEFAULT_DAILY_TRADE_LIMIT};
use crate::trading::{RoundAction, TradingConfig};

/// Rebalancing trade bot CLI.
#[derive(Parser)]
#[command(name = "rebalance-bot")]
#[command(about = "Keep coin positions near a target value on MAX", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./rebalance.db?mode=rwc")]
    database: String,

    /// Directory for trade ledgers and their backups
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Quote currency of every market
    #[arg(long, default_value = "twd")]
    quote: String,

    /// Seconds to wait for trade approval
    #[arg(long, default_value = "300")]
    confirmation_timeout: u64,

    /// Dry run: place no real orders and use the separate dry-run ledgers
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the rebalancing loop
    Run {
        /// Seconds between execution rounds
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Run a single execution round and print the results
    Once,

    /// Create a strategy
    Create(CreateArgs),

    /// Change parameters of a strategy; omitted values are kept
    Update(UpdateArgs),

    /// Delete a strategy and back up its ledger
    Delete { name: String },

    /// Let a strategy take part in rounds again
    Enable { name: String },

    /// Stop a strategy from trading
    Disable { name: String },

    /// Show all strategies with live figures
    List,

    /// Show trade history, newest first
    History {
        /// Only this strategy
        name: Option<String>,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show trading statistics
    Stats {
        /// Only this strategy
        name: Option<String>,
    },

    /// Check exchange connectivity
    Check,
}

#[derive(Args)]
struct CreateArgs {
    /// Unique strategy name
    name: String,

    /// Coin symbol, e.g. BTC
    #[arg(short, long)]
    coin: String,

    /// Target position value in quote currency
    #[arg(short, long)]
    target: Decimal,

    /// Extra net investment allowed above the target
    #[arg(long, default_value = "0")]
    add_on: Decimal,

    /// Position value that triggers a full sell
    #[arg(long)]
    take_profit: Decimal,

    /// Tolerated deviation from target in percent
    #[arg(long, default_value = "5")]
    deviation: Decimal,

    /// Trades per day before approval is required
    #[arg(long, default_value_t = DEFAULT_DAILY_TRADE_LIMIT)]
    daily_limit: u32,

    /// Trade amount requiring approval (0 disables)
    #[arg(long, default_value = "0")]
    threshold: Decimal,

    /// Create the strategy disabled
    #[arg(long)]
    inactive: bool,
}

#[derive(Args)]
struct UpdateArgs {
    name: String,

    #[arg(short, long)]
    coin: Option<String>,

    #[arg(short, long)]
    target: Option<Decimal>,

    #[arg(long)]
    add_on: Option<Decimal>,

    #[arg(long)]
    take_profit: Option<Decimal>,

    #[arg(long)]
    deviation: Option<Decimal>,

    #[arg(long)]
    daily_limit: Option<u32>,

    #[arg(long)]
    threshold: Option<Decimal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let trading_config = TradingConfig {
        quote_currency: cli.quote.to_lowercase(),
        confirmation_timeout_secs: cli.confirmation_timeout,
        ..TradingConfig::with_data_dir(&cli.data_dir)
    };
    let mut bot_config = BotConfig {
        trading_config,
        database_url: cli.database.clone(),
        dry_run: cli.dry_run,
        ..BotConfig::default()
    };

    match cli.command {
        Commands::Run { interval } => {
            bot_config.poll_interval_secs = interval;

            let bot = Bot::new(bot_config).await?;
            let strategies = bot.manager().strategy_configs().await;
            if strategies.is_empty() {
                println!("No strategies configured. Use 'rebalance-bot create' first.");
                return Ok(());
            }

            println!("\n=== Rebalancing Trade Bot ===");
            println!("Round interval: {}s", interval);
            println!("Mode: {}", if bot.is_dry_run() { "DRY RUN (no real orders)" } else { "LIVE TRADING" });
            println!(
                "Strategies: {} ({} active)",
                strategies.len(),
                strategies.iter().filter(|s| s.is_active).count()
            );
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }
        }

        Commands::Once => {
            let bot = Bot::new(bot_config).await?;

            let results = bot.run_once().await;
            if results.is_empty() {
                println!("No trades this round.");
            }
            for result in results {
                let label = match result.action {
                    RoundAction::TakeProfit => "TAKE-PROFIT",
                    RoundAction::Trade => "TRADE",
                    RoundAction::Failed => "FAILED",
                };
                println!("{:<20} {:<12} {}", truncate(&result.strategy_name, 20), label, result.message);
            }
        }

        Commands::Create(args) => {
            let config = StrategyConfig::new(
                args.name,
                args.coin.to_uppercase(),
                args.target,
                args.add_on,
                args.take_profit,
                args.deviation,
            )?
            .with_daily_trade_limit(args.daily_limit)
            .with_confirm_amount_threshold(args.threshold)?;
            let name = config.name.clone();

            let bot = Bot::new(bot_config).await?;
            let manager = bot.manager();
            manager.create_strategy(config).await?;
            if args.inactive {
                manager.disable_strategy(&name).await?;
            }

            info!(strategy = %name, "Strategy created");
            println!("Created strategy: {}", name);
        }

        Commands::Update(args) => {
            let bot = Bot::new(bot_config).await?;
            let manager = bot.manager();
            let Some(mut config) = manager.get_strategy(&args.name).await else {
                println!("Strategy not found: {}", args.name);
                return Ok(());
            };

            if let Some(coin) = args.coin {
                config.coin = coin.to_uppercase();
            }
            if let Some(target) = args.target {
                config.target_investment = target;
            }
            if let Some(add_on) = args.add_on {
                config.max_position_add_on = add_on;
            }
            if let Some(take_profit) = args.take_profit {
                config.take_profit_value = take_profit;
            }
            if let Some(deviation) = args.deviation {
                config.auto_trade_deviation_percent = deviation;
            }
            if let Some(limit) = args.daily_limit {
                config.daily_trade_limit = limit;
            }
            if let Some(threshold) = args.threshold {
                config.confirm_amount_threshold = threshold;
            }

            manager.update_strategy(config).await?;
            println!("Updated strategy: {}", args.name);
        }

        Commands::Delete { name } => {
            let bot = Bot::new(bot_config).await?;
            bot.manager().delete_strategy(&name).await?;
            println!("Deleted strategy: {} (ledger moved to backup)", name);
        }

        Commands::Enable { name } => {
            let bot = Bot::new(bot_config).await?;
            bot.manager().enable_strategy(&name).await?;
            println!("Enabled strategy: {}", name);
        }

        Commands::Disable { name } => {
            let bot = Bot::new(bot_config).await?;
            bot.manager().disable_strategy(&name).await?;
            println!("Disabled strategy: {}", name);
        }

        Commands::List => {
            let bot = Bot::new(bot_config).await?;
            let overviews = bot.manager().strategy_overviews().await;

            if overviews.is_empty() {
                println!("No strategies configured.");
                return Ok(());
            }

            println!(
                "\n{:<16} {:<6} {:<6} {:>14} {:>14} {:>12} {:>12} {:>12} {:>14} {:>14} {:>8}",
                "NAME", "COIN", "ACTIVE", "BALANCE", "PRICE", "VALUE", "TARGET", "PROFIT", "BUY BELOW", "SELL ABOVE", "TODAY"
            );
            println!("{}", "-".repeat(140));

            for o in overviews {
                println!(
                    "{:<16} {:<6} {:<6} {:>14} {:>14.2} {:>12.2} {:>12.2} {:>12.2} {:>14.2} {:>14.2} {:>4}/{:<3}",
                    truncate(&o.config.name, 16),
                    o.config.coin,
                    if o.config.is_active { "yes" } else { "no" },
                    o.current_balance.round_dp(8).normalize(),
                    o.current_price,
                    o.current_value,
                    o.config.target_investment,
                    o.net_profit,
                    o.buy_trigger_price,
                    o.sell_trigger_price,
                    o.today_trade_count,
                    o.config.daily_trade_limit
                );
            }
        }

        Commands::History { name, limit } => {
            let bot = Bot::new(bot_config).await?;
            let history = bot.manager().trading_history(name.as_deref()).await?;

            if history.is_empty() {
                println!("No trades recorded.");
                return Ok(());
            }

            println!(
                "\n{:<20} {:<16} {:<6} {:<5} {:>14} {:>14} {:>12} {:<9}",
                "TIME", "STRATEGY", "COIN", "SIDE", "VOLUME", "PRICE", "AMOUNT", "CONFIRMED"
            );
            println!("{}", "-".repeat(104));

            for entry in history.iter().take(limit) {
                let r = &entry.record;
                println!(
                    "{:<20} {:<16} {:<6} {:<5} {:>14} {:>14.2} {:>12.2} {:<9}",
                    r.trade_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    truncate(&r.strategy_name, 16),
                    entry.coin,
                    r.action,
                    r.volume.round_dp(8).normalize(),
                    r.price,
                    r.amount,
                    if r.confirmed { "yes" } else { "no" }
                );
            }
        }

        Commands::Stats { name } => {
            let bot = Bot::new(bot_config).await?;
            let stats = bot.manager().trading_stats(name.as_deref()).await?;

            println!("\n=== Trading Statistics: {} ===\n", name.as_deref().unwrap_or("all strategies"));
            println!("{}", stats);
        }

        Commands::Check => {
            let bot = Bot::new(bot_config).await?;
            match bot.check_connection().await {
                Ok(()) => println!("MAX exchange reachable."),
                Err(e) => println!("MAX exchange unreachable: {:#}", e),
            }
        }
    }

    Ok(())
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
