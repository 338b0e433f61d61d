//! Database persistence for full bot state management.
//!
//! Stores everything needed to resume after restart:
//! - The ledger snapshot (open positions + closed-trade history)
//! - The feed cursor (last seen timestamp + seen transaction hashes)
//! - Cumulative bot state
//!
//! Sizes, prices, and PnL are stored as decimal strings so a restored
//! snapshot is bit-identical to the one saved; replaying fills on top of
//! it reproduces the same ledger state as an uninterrupted run.

use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{Classification, ClosedTrade, Direction, Position};
use crate::trading::LedgerSnapshot;

/// Database connection pool with full state management.
pub struct Database {
    pool: SqlitePool,
}

/// Bot state stored in database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BotStateRow {
    pub id: i64,
    pub last_seen_timestamp: i64,
    pub total_fills: i64,
    pub realized_pnl: String,
    pub is_running: bool,
    pub started_at: String,
    pub updated_at: String,
}

/// Stored position row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PositionRow {
    pub token_id: String,
    pub market_id: String,
    pub outcome: String,
    pub direction: String,
    pub size: String,
    pub entry_price: String,
    pub opened_at: String,
    pub updated_at: String,
}

/// Stored closed-trade row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ClosedTradeRow {
    pub market_id: String,
    pub token_id: String,
    pub outcome: String,
    pub kind: String,
    pub closing_size: String,
    pub entry_price: String,
    pub exit_price: String,
    pub realized_pnl: String,
    pub closed_at: String,
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_seen_timestamp INTEGER NOT NULL DEFAULT 0,
                total_fills INTEGER NOT NULL DEFAULT 0,
                realized_pnl TEXT NOT NULL DEFAULT '0',
                is_running INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_fills (
                tx_hash TEXT PRIMARY KEY,
                seen_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                token_id TEXT PRIMARY KEY,
                market_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                direction TEXT NOT NULL,
                size TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS closed_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                kind TEXT NOT NULL,
                closing_size TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                closed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // === Ledger snapshot ===

    /// Replace the stored open positions with the current set.
    ///
    /// Runs in one transaction so a crash mid-save never leaves a mix of
    /// old and new rows.
    pub async fn save_positions(&self, positions: &[Position]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM positions").execute(&mut *tx).await?;

        for position in positions {
            sqlx::query(
                r#"
                INSERT INTO positions
                    (token_id, market_id, outcome, direction, size, entry_price, opened_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&position.token_id)
            .bind(&position.market_id)
            .bind(&position.outcome)
            .bind(position.direction.as_str())
            .bind(position.size.to_string())
            .bind(position.entry_price.to_string())
            .bind(position.opened_at.to_rfc3339())
            .bind(position.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Append one closed-trade record. Records are immutable once written.
    pub async fn append_closed_trade(&self, trade: &ClosedTrade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO closed_trades
                (market_id, token_id, outcome, kind, closing_size, entry_price, exit_price, realized_pnl, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.market_id)
        .bind(&trade.token_id)
        .bind(&trade.outcome)
        .bind(trade.kind.as_str())
        .bind(trade.closing_size.to_string())
        .bind(trade.entry_price.to_string())
        .bind(trade.exit_price.to_string())
        .bind(trade.realized_pnl.to_string())
        .bind(trade.closed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the full ledger snapshot.
    pub async fn load_snapshot(&self) -> Result<LedgerSnapshot> {
        let position_rows: Vec<PositionRow> =
            sqlx::query_as("SELECT * FROM positions ORDER BY opened_at")
                .fetch_all(&self.pool)
                .await?;

        let closed_rows: Vec<ClosedTradeRow> = sqlx::query_as(
            "SELECT market_id, token_id, outcome, kind, closing_size, entry_price, exit_price, realized_pnl, closed_at FROM closed_trades ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let positions = position_rows
            .into_iter()
            .map(position_from_row)
            .collect::<Result<Vec<_>>>()?;
        let closed_trades = closed_rows
            .into_iter()
            .map(closed_trade_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(LedgerSnapshot {
            positions,
            closed_trades,
        })
    }

    // === Feed cursor ===

    /// Record a processed transaction hash.
    pub async fn mark_fill_seen(&self, tx_hash: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO seen_fills (tx_hash) VALUES (?)")
            .bind(tx_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All previously processed transaction hashes.
    pub async fn seen_fill_hashes(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT tx_hash FROM seen_fills")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    // === Bot state ===

    /// Initialize or fetch the singleton bot state row.
    pub async fn init_bot_state(&self) -> Result<BotStateRow> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO bot_state (id, last_seen_timestamp)
            VALUES (1, strftime('%s', 'now'))
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE bot_state SET is_running = 1, updated_at = CURRENT_TIMESTAMP WHERE id = 1")
            .execute(&self.pool)
            .await?;

        self.bot_state().await
    }

    /// Current bot state row.
    pub async fn bot_state(&self) -> Result<BotStateRow> {
        sqlx::query_as("SELECT * FROM bot_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("bot state not initialized"))
    }

    /// Update cumulative bot state after a processed fill.
    pub async fn update_bot_state(
        &self,
        last_seen_timestamp: i64,
        realized_pnl: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bot_state
            SET last_seen_timestamp = MAX(last_seen_timestamp, ?),
                total_fills = total_fills + 1,
                realized_pnl = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = 1
            "#,
        )
        .bind(last_seen_timestamp)
        .bind(realized_pnl.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark the bot as stopped.
    pub async fn mark_bot_stopped(&self) -> Result<()> {
        sqlx::query("UPDATE bot_state SET is_running = 0, updated_at = CURRENT_TIMESTAMP WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_decimal(value: &str, what: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("invalid stored {what}: {value}"))
}

fn parse_timestamp(value: &str, what: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid stored {what}: {value}"))
}

fn position_from_row(row: PositionRow) -> Result<Position> {
    let direction = match row.direction.as_str() {
        "LONG" => Direction::Long,
        "SHORT" => Direction::Short,
        other => return Err(anyhow!("invalid stored direction: {other}")),
    };

    Ok(Position {
        token_id: row.token_id,
        market_id: row.market_id,
        outcome: row.outcome,
        size: parse_decimal(&row.size, "size")?,
        entry_price: parse_decimal(&row.entry_price, "entry price")?,
        direction,
        opened_at: parse_timestamp(&row.opened_at, "opened_at")?,
        updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
    })
}

fn closed_trade_from_row(row: ClosedTradeRow) -> Result<ClosedTrade> {
    let kind = Classification::from_str(&row.kind).map_err(|e| anyhow!(e))?;

    Ok(ClosedTrade {
        market_id: row.market_id,
        token_id: row.token_id,
        outcome: row.outcome,
        kind,
        closing_size: parse_decimal(&row.closing_size, "closing size")?,
        entry_price: parse_decimal(&row.entry_price, "entry price")?,
        exit_price: parse_decimal(&row.exit_price, "exit price")?,
        realized_pnl: parse_decimal(&row.realized_pnl, "realized pnl")?,
        closed_at: parse_timestamp(&row.closed_at, "closed_at")?,
    })
}
