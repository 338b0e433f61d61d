//! Polymarket Copy-Trading Bot
//!
//! Mirrors a single target wallet's fills, classifies each one against
//! the local position ledger (open, add, close, reverse, hedge), and
//! books realized PnL on every close.

mod api;
mod bot;
mod db;
mod models;
mod notifier;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::Bot;
use crate::db::Database;
use crate::trading::{CopyConfig, Ledger};

/// Polymarket mirror-trading bot CLI.
#[derive(Parser)]
#[command(name = "polymirror")]
#[command(about = "Mirror a Polymarket wallet's trades with position tracking", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        default_value = "sqlite:./polymirror.db?mode=rwc",
        env = "DATABASE_URL"
    )]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mirroring the target wallet
    Run {
        /// Proxy wallet address to mirror
        #[arg(short, long, env = "TARGET_WALLET")]
        target: String,

        /// Position sizing multiplier (1.0 = exact copy)
        #[arg(long, default_value = "1.0", env = "RISK_MULTIPLIER")]
        multiplier: f64,

        /// Maximum USDC value per mirrored trade
        #[arg(long, default_value = "100.0", env = "MAX_TRADE_USDC")]
        max_usdc: f64,

        /// Polling interval in seconds
        #[arg(short, long, default_value = "2", env = "POLL_INTERVAL_SECONDS")]
        interval: u64,

        /// Classify and book fills without placing real orders
        #[arg(long, env = "DRY_RUN")]
        dry_run: bool,
    },

    /// Show bot state and cumulative realized PnL
    Status,

    /// List open positions
    Positions,

    /// Show closed-trade history
    History {
        /// Maximum number of trades to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            target,
            multiplier,
            max_usdc,
            interval,
            dry_run,
        } => {
            let config = CopyConfig {
                target_wallet: target,
                risk_multiplier: Decimal::try_from(multiplier)?,
                max_trade_usdc: Decimal::try_from(max_usdc)?,
                poll_interval_secs: interval,
                dry_run,
                database_url: cli.database,
                telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
                telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
            };

            print_banner(&config);

            let mut bot = Bot::new(config).await?;
            bot.initialize().await?;
            bot.run().await?;
        }

        Commands::Status => {
            let db = Database::new(&cli.database).await?;
            let state = db.bot_state().await?;
            let ledger = Ledger::from_snapshot(db.load_snapshot().await?);

            println!("=== Bot Status ===");
            println!(
                "Status:          {}",
                if state.is_running { "Running" } else { "Stopped" }
            );
            println!("Fills Processed: {}", state.total_fills);
            println!("Open Positions:  {}", ledger.open_positions().len());
            println!("Closed Trades:   {}", ledger.closed_trades(usize::MAX).len());
            println!("Realized PnL:    ${:.2}", ledger.cumulative_realized_pnl());
        }

        Commands::Positions => {
            let db = Database::new(&cli.database).await?;
            let ledger = Ledger::from_snapshot(db.load_snapshot().await?);
            let positions = ledger.open_positions();

            if positions.is_empty() {
                println!("No open positions.");
                return Ok(());
            }

            println!(
                "\n{:<18} {:<10} {:<6} {:>12} {:>10}",
                "MARKET", "OUTCOME", "DIR", "SIZE", "ENTRY"
            );
            println!("{}", "-".repeat(60));

            for position in positions {
                println!(
                    "{:<18} {:<10} {:<6} {:>12.2} {:>10.4}",
                    truncate(&position.market_id, 16),
                    truncate(&position.outcome, 8),
                    position.direction.as_str(),
                    position.size,
                    position.entry_price,
                );
            }
        }

        Commands::History { limit } => {
            let db = Database::new(&cli.database).await?;
            let ledger = Ledger::from_snapshot(db.load_snapshot().await?);
            let trades = ledger.closed_trades(limit);

            if trades.is_empty() {
                println!("No closed trades yet.");
                return Ok(());
            }

            println!(
                "\n{:<18} {:<10} {:<14} {:>10} {:>8} {:>8} {:>10}",
                "MARKET", "OUTCOME", "KIND", "SIZE", "ENTRY", "EXIT", "PNL"
            );
            println!("{}", "-".repeat(84));

            let mut total = Decimal::ZERO;
            for trade in &trades {
                total += trade.realized_pnl;
                println!(
                    "{:<18} {:<10} {:<14} {:>10.2} {:>8.4} {:>8.4} {:>10.2}",
                    truncate(&trade.market_id, 16),
                    truncate(&trade.outcome, 8),
                    trade.kind.as_str(),
                    trade.closing_size,
                    trade.entry_price,
                    trade.exit_price,
                    trade.realized_pnl,
                );
            }

            println!("{}", "-".repeat(84));
            println!("{:>78.2}", total);

            info!(shown = trades.len(), "Closed trades listed");
        }
    }

    Ok(())
}

/// Print startup banner with the effective configuration.
fn print_banner(config: &CopyConfig) {
    info!("============================================================");
    info!("   POLYMARKET MIRROR BOT");
    info!("============================================================");
    info!("This bot trades with real money. Only use funds you can afford to lose.");
    info!("Configuration:");
    info!("  Target Wallet:   {}", config.target_wallet);
    info!("  Max Trade Size:  ${}", config.max_trade_usdc);
    info!("  Risk Multiplier: {}x", config.risk_multiplier);
    info!("  Poll Interval:   {}s", config.poll_interval_secs);
    info!("  Dry Run Mode:    {}", config.dry_run);
    info!(
        "  Notifications:   {}",
        if config.telegram().is_some() {
            "Telegram"
        } else {
            "disabled"
        }
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}
