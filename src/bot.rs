//! Bot runner: main orchestration loop with full state management.
//!
//! Handles:
//! - Polling the target wallet's fills from the Data API
//! - Sizing each fill against the copy limits
//! - Classifying fills against the position ledger and booking PnL
//! - Mirroring fills as CLOB orders
//! - Persisting state for crash recovery and sending notifications
//!
//! Fills are processed strictly one at a time, oldest first: the hedge
//! check reads cross-token state and the close logic reads same-token
//! state, so two fills for one market must never race.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::{ClobClient, FeedClient};
use crate::db::Database;
use crate::models::Fill;
use crate::notifier::{format_classification, Notifier};
use crate::trading::{classify, CopyConfig, CopySizer, Ledger, TrackError};

/// Main bot runner.
pub struct Bot {
    config: CopyConfig,
    db: Database,
    feed: FeedClient,
    clob: Option<ClobClient>,
    notifier: Option<Notifier>,
    sizer: CopySizer,

    // Our account's exposure and realized history
    ledger: Arc<RwLock<Ledger>>,

    // Feed cursor
    seen: HashSet<String>,
    last_seen_timestamp: i64,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    /// Create a new bot instance.
    pub async fn new(config: CopyConfig) -> Result<Self> {
        let db = Database::new(&config.database_url).await?;
        let feed = FeedClient::new()?;
        let sizer = CopySizer::new(&config);

        let clob = if !config.dry_run {
            match ClobClient::from_env() {
                Ok(client) => {
                    info!(address = ?client.address(), "CLOB client initialized");
                    Some(client)
                }
                Err(e) => {
                    warn!("CLOB client not configured: {}. Running in dry-run mode.", e);
                    None
                }
            }
        } else {
            None
        };

        let notifier = config
            .telegram()
            .map(|(token, chat_id)| Notifier::new(token, chat_id));

        Ok(Self {
            config,
            db,
            feed,
            clob,
            notifier,
            sizer,
            ledger: Arc::new(RwLock::new(Ledger::new())),
            seen: HashSet::new(),
            last_seen_timestamp: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Shared handle to the ledger for status queries.
    pub fn ledger(&self) -> Arc<RwLock<Ledger>> {
        self.ledger.clone()
    }

    /// Restore state from the database or start fresh.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing bot...");

        let state = self.db.init_bot_state().await?;
        self.last_seen_timestamp = state.last_seen_timestamp;
        self.seen = self.db.seen_fill_hashes().await?;

        let snapshot = self.db.load_snapshot().await?;
        let ledger = Ledger::from_snapshot(snapshot);

        if state.total_fills > 0 {
            info!(
                total_fills = state.total_fills,
                open_positions = ledger.open_positions().len(),
                realized_pnl = %ledger.cumulative_realized_pnl(),
                "Resuming from previous session"
            );
        }

        *self.ledger.write().await = ledger;

        info!(
            target = %self.config.target_wallet,
            seen_fills = self.seen.len(),
            "Bot initialized"
        );

        Ok(())
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            "Starting bot run loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in bot tick");
            }
        }

        self.shutdown().await?;

        Ok(())
    }

    /// Single iteration of the main loop.
    async fn tick(&mut self) -> Result<()> {
        debug!("Bot tick");

        let fills = self
            .feed
            .fetch_fills_since(
                &self.config.target_wallet,
                self.last_seen_timestamp,
                &self.seen,
            )
            .await?;

        for fill in fills {
            if let Err(e) = self.process_fill(fill).await {
                warn!(error = %e, "Failed to process fill");
            }
        }

        Ok(())
    }

    /// Process one source fill end to end.
    async fn process_fill(&mut self, source: Fill) -> Result<()> {
        info!(
            market = %source.market_id,
            outcome = %source.outcome,
            side = %source.side.as_str(),
            size = %source.size,
            price = %source.price,
            value = %source.usdc_value().round_dp(2),
            tx = %source.tx_hash,
            "New fill detected"
        );

        let mirrored_size = self.sizer.size_for(&source);
        if mirrored_size <= Decimal::ZERO {
            debug!(tx = %source.tx_hash, "Fill sized to zero, skipping");
            self.commit_cursor(&source).await?;
            return Ok(());
        }

        let fill = source.with_size(mirrored_size);
        if fill.size != source.size {
            info!(
                our_size = %fill.size.round_dp(2),
                source_size = %source.size,
                "Copy size adjusted"
            );
        }

        // Classify against our exposure. Invalid fills are reported and
        // dropped; the feed will not resend them.
        let evaluation = {
            let ledger = self.ledger.read().await;
            classify(&ledger, &fill)
        };
        let evaluation = match evaluation {
            Ok(evaluation) => evaluation,
            Err(TrackError::InvalidEvent { tx_hash, reason }) => {
                warn!(tx = %tx_hash, reason = %reason, "Fill rejected");
                self.commit_cursor(&source).await?;
                return Ok(());
            }
            Err(e @ TrackError::InconsistentState { .. }) => {
                error!(error = %e, "Ledger anomaly, dropping fill");
                self.commit_cursor(&source).await?;
                return Ok(());
            }
        };

        info!(
            kind = %evaluation.kind.as_str(),
            pnl = ?evaluation.closed.as_ref().map(|c| c.realized_pnl),
            "Fill classified"
        );

        // Mirror the order. Execution failures are collaborator trouble;
        // the ledger still books what the classification decided.
        match &self.clob {
            Some(clob) if !self.config.dry_run => {
                match clob.mirror_fill(&fill, mirrored_size).await {
                    Ok(response) => {
                        info!(order_id = ?response.order_id, "Mirror order placed");
                    }
                    Err(e) => {
                        error!(error = %e, "Mirror order failed");
                    }
                }
            }
            _ => {
                info!(
                    side = %fill.side.as_str(),
                    size = %fill.size.round_dp(2),
                    price = %fill.price,
                    "[DRY RUN] Would place mirror order"
                );
            }
        }

        // Apply the whole evaluation as one unit, then persist.
        let (positions, realized_pnl) = {
            let mut ledger = self.ledger.write().await;
            ledger.apply(&evaluation)?;
            let snapshot = ledger.snapshot();
            (snapshot.positions, ledger.cumulative_realized_pnl())
        };

        self.db.save_positions(&positions).await?;
        if let Some(closed) = &evaluation.closed {
            self.db.append_closed_trade(closed).await?;
        }
        self.commit_cursor(&source).await?;
        self.db
            .update_bot_state(source.timestamp.timestamp(), realized_pnl)
            .await?;

        if let Some(notifier) = &self.notifier {
            notifier.send(&format_classification(&fill, &evaluation)).await;
        }

        Ok(())
    }

    /// Advance the feed cursor past a fill, in memory and on disk.
    async fn commit_cursor(&mut self, source: &Fill) -> Result<()> {
        self.db
            .mark_fill_seen(&source.tx_hash)
            .await
            .context("Failed to record seen fill")?;
        self.seen.insert(source.tx_hash.clone());
        self.last_seen_timestamp = self.last_seen_timestamp.max(source.timestamp.timestamp());
        Ok(())
    }

    /// Graceful shutdown.
    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down bot...");

        self.db.mark_bot_stopped().await?;

        let ledger = self.ledger.read().await;
        self.db.save_positions(&ledger.snapshot().positions).await?;

        info!("Bot shutdown complete");
        Ok(())
    }
}
