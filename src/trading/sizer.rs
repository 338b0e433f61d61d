//! Copy sizing: pre-processing applied to a source fill's size before it
//! reaches the classification engine.
//!
//! The engine itself never sizes orders or enforces limits; whatever share
//! count leaves here is what gets classified and mirrored.

use rust_decimal::Decimal;

use crate::models::Fill;

use super::CopyConfig;

/// Scales source fills by the risk multiplier and caps per-trade notional.
pub struct CopySizer {
    risk_multiplier: Decimal,
    max_trade_usdc: Decimal,
}

impl CopySizer {
    pub fn new(config: &CopyConfig) -> Self {
        Self {
            risk_multiplier: config.risk_multiplier,
            max_trade_usdc: config.max_trade_usdc,
        }
    }

    /// Shares to mirror for a source fill.
    ///
    /// Applies the risk multiplier, then shrinks the result so
    /// `size * price` stays within the per-trade USDC cap. Returns zero
    /// when the fill cannot be priced (free or unpriced fills are not
    /// mirrored).
    pub fn size_for(&self, fill: &Fill) -> Decimal {
        if fill.price <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let desired = fill.size * self.risk_multiplier;
        let notional = desired * fill.price;

        if notional > self.max_trade_usdc {
            self.max_trade_usdc / fill.price
        } else {
            desired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn fill(size: Decimal, price: Decimal) -> Fill {
        Fill {
            tx_hash: "0xabc".to_string(),
            market_id: "0xmarket".to_string(),
            token_id: "111".to_string(),
            outcome: "Up".to_string(),
            side: Side::Buy,
            size,
            price,
            timestamp: Utc::now(),
        }
    }

    fn sizer(multiplier: Decimal, max_usdc: Decimal) -> CopySizer {
        CopySizer::new(&CopyConfig {
            risk_multiplier: multiplier,
            max_trade_usdc: max_usdc,
            ..CopyConfig::default()
        })
    }

    #[test]
    fn test_exact_copy_under_cap() {
        let sizer = sizer(dec!(1.0), dec!(100));
        assert_eq!(sizer.size_for(&fill(dec!(50), dec!(0.40))), dec!(50));
    }

    #[test]
    fn test_multiplier_scales_size() {
        let sizer = sizer(dec!(0.5), dec!(100));
        assert_eq!(sizer.size_for(&fill(dec!(50), dec!(0.40))), dec!(25));
    }

    #[test]
    fn test_cap_shrinks_notional() {
        // 1000 shares at 0.50 would be $500; cap at $100 -> 200 shares.
        let sizer = sizer(dec!(1.0), dec!(100));
        assert_eq!(sizer.size_for(&fill(dec!(1000), dec!(0.50))), dec!(200));
    }

    #[test]
    fn test_unpriced_fill_is_skipped() {
        let sizer = sizer(dec!(1.0), dec!(100));
        assert_eq!(sizer.size_for(&fill(dec!(1000), dec!(0))), dec!(0));
    }
}
