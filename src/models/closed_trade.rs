//! Closed-trade record: realized PnL booked at the moment of a close.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a fill meant relative to the exposure held when it arrived.
///
/// Downstream consumers (notifier, status rendering) match on this
/// exhaustively; adding a variant is a breaking change for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// First exposure on a token
    Open,
    /// Same-direction addition to an existing position
    Increase,
    /// Opposing fill that shrinks the position
    PartialClose,
    /// Opposing fill that exactly unwinds the position
    FullClose,
    /// Opposing fill larger than the position: close it and flip direction
    Reverse,
    /// Buying the other outcome fully unwinds the held side of the market
    HedgeClose,
    /// Buying the other outcome shrinks the held side of the market
    PartialHedge,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Open => "OPEN",
            Classification::Increase => "INCREASE",
            Classification::PartialClose => "PARTIAL_CLOSE",
            Classification::FullClose => "FULL_CLOSE",
            Classification::Reverse => "REVERSE",
            Classification::HedgeClose => "HEDGE_CLOSE",
            Classification::PartialHedge => "PARTIAL_HEDGE",
        }
    }

    /// True for the kinds that book realized PnL.
    pub fn realizes_pnl(&self) -> bool {
        !matches!(self, Classification::Open | Classification::Increase)
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Classification::Open),
            "INCREASE" => Ok(Classification::Increase),
            "PARTIAL_CLOSE" => Ok(Classification::PartialClose),
            "FULL_CLOSE" => Ok(Classification::FullClose),
            "REVERSE" => Ok(Classification::Reverse),
            "HEDGE_CLOSE" => Ok(Classification::HedgeClose),
            "PARTIAL_HEDGE" => Ok(Classification::PartialHedge),
            other => Err(format!("unknown classification: {other}")),
        }
    }
}

/// Immutable record of a close, partial close, reverse, or hedge.
///
/// Appended to the ledger's history and never mutated; the sum of
/// `realized_pnl` over all records is the account's cumulative realized PnL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Market the closed leg belonged to
    pub market_id: String,

    /// Token of the closed leg (on a hedge, the opposite outcome's token)
    pub token_id: String,

    /// Outcome label of the closed leg
    pub outcome: String,

    /// How the close came about
    pub kind: Classification,

    /// Shares unwound by this event
    pub closing_size: Decimal,

    /// Volume-weighted entry price of the unwound shares
    pub entry_price: Decimal,

    /// Price of the fill that triggered the close
    pub exit_price: Decimal,

    /// PnL fixed at the moment of the close
    pub realized_pnl: Decimal,

    /// When the close happened
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realizes_pnl() {
        assert!(!Classification::Open.realizes_pnl());
        assert!(!Classification::Increase.realizes_pnl());
        assert!(Classification::PartialClose.realizes_pnl());
        assert!(Classification::FullClose.realizes_pnl());
        assert!(Classification::Reverse.realizes_pnl());
        assert!(Classification::HedgeClose.realizes_pnl());
        assert!(Classification::PartialHedge.realizes_pnl());
    }

    #[test]
    fn test_classification_round_trip() {
        for kind in [
            Classification::Open,
            Classification::Increase,
            Classification::PartialClose,
            Classification::FullClose,
            Classification::Reverse,
            Classification::HedgeClose,
            Classification::PartialHedge,
        ] {
            assert_eq!(kind.as_str().parse::<Classification>(), Ok(kind));
        }
    }
}
