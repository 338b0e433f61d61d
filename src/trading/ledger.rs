//! Position ledger: open exposure per token plus closed-trade history.
//!
//! The ledger is an owned, injectable store: the bot holds one instance
//! behind a lock, tests build isolated ones. It applies a fill's entire
//! evaluation as a single unit, so readers never observe a reverse or
//! hedge with only one of its two legs written.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{ClosedTrade, Position};

use super::classifier::{Evaluation, LedgerDelta, TrackError};

/// Serializable snapshot of the full ledger state.
///
/// Round-trips losslessly: restoring a snapshot and replaying subsequent
/// fills reproduces the same final state as an uninterrupted run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub positions: Vec<Position>,
    pub closed_trades: Vec<ClosedTrade>,
}

/// In-memory position store for one account.
#[derive(Debug, Default)]
pub struct Ledger {
    /// Open positions keyed by token id
    positions: HashMap<String, Position>,
    /// Append-only history of realized closes
    closed: Vec<ClosedTrade>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from a saved snapshot.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let positions = snapshot
            .positions
            .into_iter()
            .map(|p| (p.token_id.clone(), p))
            .collect();
        Self {
            positions,
            closed: snapshot.closed_trades,
        }
    }

    /// Snapshot the full state for persistence.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.token_id.cmp(&b.token_id))
        });
        LedgerSnapshot {
            positions,
            closed_trades: self.closed.clone(),
        }
    }

    /// Open position on a token, if any.
    pub fn position(&self, token_id: &str) -> Option<&Position> {
        self.positions.get(token_id)
    }

    /// Position held on the same market's other outcome, if any.
    pub fn opposite_position(&self, market_id: &str, token_id: &str) -> Option<&Position> {
        self.positions
            .values()
            .find(|p| p.market_id == market_id && p.token_id != token_id)
    }

    /// All open positions, oldest first.
    pub fn open_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.token_id.cmp(&b.token_id))
        });
        positions
    }

    /// Most recent closed trades, newest first, up to `limit`.
    pub fn closed_trades(&self, limit: usize) -> Vec<&ClosedTrade> {
        self.closed.iter().rev().take(limit).collect()
    }

    /// Sum of realized PnL over every closed-trade record.
    pub fn cumulative_realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|t| t.realized_pnl).sum()
    }

    /// Apply one fill's evaluation: the position delta and, where the
    /// classification realized PnL, the closed-trade record, as one unit.
    ///
    /// Validates before touching anything, so a rejected delta leaves the
    /// ledger exactly as it was.
    pub fn apply(&mut self, evaluation: &Evaluation) -> Result<(), TrackError> {
        self.check(&evaluation.delta)?;

        match &evaluation.delta {
            LedgerDelta::Upsert(position) => {
                self.positions
                    .insert(position.token_id.clone(), position.clone());
            }
            LedgerDelta::Remove { token_id } => {
                self.positions.remove(token_id);
            }
            LedgerDelta::Swap {
                remove_token_id,
                upsert,
            } => {
                self.positions.remove(remove_token_id);
                self.positions.insert(upsert.token_id.clone(), upsert.clone());
            }
            LedgerDelta::UpsertBoth { reduced, entered } => {
                self.positions
                    .insert(reduced.token_id.clone(), reduced.clone());
                self.positions
                    .insert(entered.token_id.clone(), entered.clone());
            }
        }

        if let Some(closed) = &evaluation.closed {
            self.closed.push(closed.clone());
        }

        Ok(())
    }

    fn check(&self, delta: &LedgerDelta) -> Result<(), TrackError> {
        let must_exist = |token_id: &str| {
            if self.positions.contains_key(token_id) {
                Ok(())
            } else {
                Err(TrackError::InconsistentState {
                    token_id: token_id.to_string(),
                    reason: "delta removes a position the ledger does not hold".to_string(),
                })
            }
        };
        let must_be_open = |position: &Position| {
            if position.size > Decimal::ZERO {
                Ok(())
            } else {
                Err(TrackError::InconsistentState {
                    token_id: position.token_id.clone(),
                    reason: format!("refusing to store non-positive size {}", position.size),
                })
            }
        };

        match delta {
            LedgerDelta::Upsert(position) => must_be_open(position),
            LedgerDelta::Remove { token_id } => must_exist(token_id),
            LedgerDelta::Swap {
                remove_token_id,
                upsert,
            } => {
                must_exist(remove_token_id)?;
                must_be_open(upsert)
            }
            LedgerDelta::UpsertBoth { reduced, entered } => {
                must_be_open(reduced)?;
                must_be_open(entered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fill, Side};
    use crate::trading::classifier::classify;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    const MARKET: &str = "0xmarket";
    const UP: &str = "111";
    const DOWN: &str = "222";

    fn fill_at(
        seq: i64,
        token: &str,
        outcome: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> Fill {
        Fill {
            tx_hash: format!("0x{seq:04}"),
            market_id: MARKET.to_string(),
            token_id: token.to_string(),
            outcome: outcome.to_string(),
            side,
            size,
            price,
            timestamp: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        }
    }

    fn sequence() -> Vec<Fill> {
        vec![
            fill_at(1, UP, "Up", Side::Buy, dec!(100), dec!(0.60)),
            fill_at(2, UP, "Up", Side::Buy, dec!(50), dec!(0.65)),
            fill_at(3, UP, "Up", Side::Sell, dec!(40), dec!(0.70)),
            fill_at(4, DOWN, "Down", Side::Buy, dec!(200), dec!(0.35)),
            fill_at(5, DOWN, "Down", Side::Sell, dec!(200), dec!(0.55)),
        ]
    }

    fn replay(ledger: &mut Ledger, fills: &[Fill]) {
        for fill in fills {
            let eval = classify(ledger, fill).unwrap();
            ledger.apply(&eval).unwrap();
        }
    }

    #[test]
    fn test_sizes_stay_strictly_positive() {
        let mut ledger = Ledger::new();
        for fill in sequence() {
            let eval = classify(&ledger, &fill).unwrap();
            ledger.apply(&eval).unwrap();
            for position in ledger.open_positions() {
                assert!(position.size > Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_cumulative_pnl_matches_record_sum() {
        let mut ledger = Ledger::new();
        replay(&mut ledger, &sequence());

        let record_sum: Decimal = ledger
            .closed_trades(usize::MAX)
            .iter()
            .map(|t| t.realized_pnl)
            .sum();
        assert_eq!(ledger.cumulative_realized_pnl(), record_sum);
        assert!(!ledger.closed_trades(usize::MAX).is_empty());
    }

    #[test]
    fn test_snapshot_replay_reproduces_final_state() {
        let fills = sequence();

        // Uninterrupted run.
        let mut full = Ledger::new();
        replay(&mut full, &fills);

        // Snapshot after every prefix, resume, replay the rest.
        for split in 0..=fills.len() {
            let mut prefix = Ledger::new();
            replay(&mut prefix, &fills[..split]);

            let mut resumed = Ledger::from_snapshot(prefix.snapshot());
            replay(&mut resumed, &fills[split..]);

            assert_eq!(
                resumed.cumulative_realized_pnl(),
                full.cumulative_realized_pnl(),
                "pnl diverged at split {split}"
            );
            assert_eq!(
                serde_json::to_string(&resumed.snapshot()).unwrap(),
                serde_json::to_string(&full.snapshot()).unwrap(),
                "state diverged at split {split}"
            );
        }
    }

    #[test]
    fn test_hedge_applies_both_legs_together() {
        let mut ledger = Ledger::new();
        replay(
            &mut ledger,
            &[
                fill_at(1, UP, "Up", Side::Buy, dec!(100), dec!(0.60)),
                fill_at(2, DOWN, "Down", Side::Buy, dec!(100), dec!(0.50)),
            ],
        );

        assert!(ledger.position(UP).is_none());
        let down = ledger.position(DOWN).unwrap();
        assert_eq!(down.size, dec!(100));
        assert_eq!(ledger.cumulative_realized_pnl(), dec!(-10.00));
    }

    #[test]
    fn test_apply_rejects_removal_of_missing_position() {
        let mut ledger = Ledger::new();
        let evaluation = Evaluation {
            kind: crate::models::Classification::FullClose,
            closed: None,
            delta: LedgerDelta::Remove {
                token_id: UP.to_string(),
            },
        };

        let err = ledger.apply(&evaluation).unwrap_err();
        assert!(matches!(err, TrackError::InconsistentState { .. }));
    }

    #[test]
    fn test_rejected_apply_leaves_state_untouched() {
        let mut ledger = Ledger::new();
        replay(
            &mut ledger,
            &[fill_at(1, UP, "Up", Side::Buy, dec!(100), dec!(0.60))],
        );
        let before = serde_json::to_string(&ledger.snapshot()).unwrap();

        let bad = Evaluation {
            kind: crate::models::Classification::FullClose,
            closed: None,
            delta: LedgerDelta::Remove {
                token_id: DOWN.to_string(),
            },
        };
        assert!(ledger.apply(&bad).is_err());

        let after = serde_json::to_string(&ledger.snapshot()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_opposite_position_lookup() {
        let mut ledger = Ledger::new();
        replay(
            &mut ledger,
            &[fill_at(1, UP, "Up", Side::Buy, dec!(100), dec!(0.60))],
        );

        assert!(ledger.opposite_position(MARKET, DOWN).is_some());
        assert!(ledger.opposite_position(MARKET, UP).is_none());
        assert!(ledger.opposite_position("0xother", DOWN).is_none());
    }
}
