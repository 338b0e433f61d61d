//! Fill model: a single executed trade reported by the feed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// A single executed buy or sell from the target wallet's activity feed.
///
/// The feed owns deduplication (by `tx_hash`) and delivers fills in
/// chronological order per market; neither is re-checked downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// On-chain transaction hash, the feed's dedup key
    pub tx_hash: String,

    /// Market condition ID this token belongs to
    pub market_id: String,

    /// Outcome token ID being traded
    pub token_id: String,

    /// Human-readable outcome label (e.g., "Up", "Down")
    pub outcome: String,

    /// Trade direction
    pub side: Side,

    /// Number of outcome tokens traded
    pub size: Decimal,

    /// Price per token in USDC (0.0 to 1.0)
    pub price: Decimal,

    /// When the fill occurred
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// USDC notional of this fill.
    pub fn usdc_value(&self) -> Decimal {
        self.size * self.price
    }

    /// Copy of this fill with a different size (used after copy sizing).
    pub fn with_size(&self, size: Decimal) -> Self {
        Self {
            size,
            ..self.clone()
        }
    }
}
