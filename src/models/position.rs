//! Position model representing currently open exposure on one outcome token.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which way a position points. Fixed at open; a position never changes
/// direction while its size is above zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Multiplying a price move by this makes
    /// realized PnL sign-correct for both holdings.
    pub fn signum(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn flipped(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

/// Open exposure on a single outcome token.
///
/// A position only exists while its size is strictly positive; fully
/// closed positions are removed from the ledger, never kept as zero rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Outcome token ID (at most one position per token)
    pub token_id: String,

    /// Market condition ID the token belongs to
    pub market_id: String,

    /// Human-readable outcome label
    pub outcome: String,

    /// Shares currently held, strictly positive
    pub size: Decimal,

    /// Volume-weighted average entry price per share
    pub entry_price: Decimal,

    /// Long or short, implied by how the position was opened
    pub direction: Direction,

    /// When the position was opened
    pub opened_at: DateTime<Utc>,

    /// Last time size or entry price changed
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Open a fresh position.
    pub fn open(
        token_id: String,
        market_id: String,
        outcome: String,
        size: Decimal,
        entry_price: Decimal,
        direction: Direction,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id,
            market_id,
            outcome,
            size,
            entry_price,
            direction,
            opened_at,
            updated_at: opened_at,
        }
    }

    /// Size with the direction's sign applied.
    pub fn signed_size(&self) -> Decimal {
        self.size * self.direction.signum()
    }

    /// Average a same-direction fill into the position (size-weighted).
    pub fn average_in(&mut self, size: Decimal, price: Decimal, at: DateTime<Utc>) {
        let new_size = self.size + size;
        if !new_size.is_zero() {
            self.entry_price = (self.size * self.entry_price + size * price) / new_size;
        }
        self.size = new_size;
        self.updated_at = at;
    }

    /// Shrink the position; entry price and direction are unchanged.
    pub fn reduce(&mut self, size: Decimal, at: DateTime<Utc>) {
        self.size -= size.min(self.size);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn up_position(size: Decimal, entry: Decimal) -> Position {
        Position::open(
            "1234".to_string(),
            "0xmarket".to_string(),
            "Up".to_string(),
            size,
            entry,
            Direction::Long,
            Utc::now(),
        )
    }

    #[test]
    fn test_average_in() {
        let mut pos = up_position(dec!(100), dec!(0.50));
        pos.average_in(dec!(100), dec!(0.60), Utc::now());

        assert_eq!(pos.size, dec!(200));
        // (100*0.50 + 100*0.60) / 200 = 0.55
        assert_eq!(pos.entry_price, dec!(0.55));
    }

    #[test]
    fn test_reduce_keeps_entry() {
        let mut pos = up_position(dec!(100), dec!(0.50));
        pos.reduce(dec!(40), Utc::now());

        assert_eq!(pos.size, dec!(60));
        assert_eq!(pos.entry_price, dec!(0.50));
    }

    #[test]
    fn test_signed_size() {
        let mut pos = up_position(dec!(100), dec!(0.50));
        assert_eq!(pos.signed_size(), dec!(100));

        pos.direction = Direction::Short;
        assert_eq!(pos.signed_size(), dec!(-100));
    }
}
