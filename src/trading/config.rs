//! Copy-trading configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for mirroring the target wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Proxy wallet address to mirror
    pub target_wallet: String,

    /// Multiplier applied to the source fill's size (1.0 = exact copy)
    pub risk_multiplier: Decimal,

    /// Maximum USDC notional allowed per mirrored trade
    pub max_trade_usdc: Decimal,

    /// Seconds between feed polls
    pub poll_interval_secs: u64,

    /// Classify and book fills without submitting CLOB orders
    pub dry_run: bool,

    /// SQLite connection string
    pub database_url: String,

    /// Telegram bot token for notifications (disabled when unset)
    pub telegram_bot_token: Option<String>,

    /// Telegram chat ID for notifications
    pub telegram_chat_id: Option<String>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            target_wallet: String::new(),
            risk_multiplier: dec!(1.0),       // Exact copy
            max_trade_usdc: dec!(100.0),      // Max $100 per trade
            poll_interval_secs: 2,
            dry_run: true,
            database_url: "sqlite:polymirror.db?mode=rwc".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

impl CopyConfig {
    /// Telegram credentials, when both halves are configured.
    pub fn telegram(&self) -> Option<(String, String)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.clone(), chat.clone())),
            _ => None,
        }
    }
}
