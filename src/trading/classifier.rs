//! Trade classification engine.
//!
//! Pure decision logic: given the ledger's current state and one fill,
//! decide what the fill means relative to existing exposure (open, add,
//! close, reverse, hedge), compute realized PnL where a close happens,
//! and emit the resulting ledger mutation as one transactional value.
//!
//! The engine performs no I/O, never logs, and never mutates the ledger
//! itself; the caller applies the returned delta atomically.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Classification, ClosedTrade, Direction, Fill, Position, Side};

use super::ledger::Ledger;

/// Shares below this count as a fully unwound position. Sizes accumulated
/// through repeated volume-weighted averaging do not land on exact zero,
/// so the tolerance is on share size, never on PnL.
pub fn size_epsilon() -> Decimal {
    Decimal::new(1, 6)
}

/// Typed failures of the tracking core.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The fill violates the feed's input contract. Fatal for that fill:
    /// it is surfaced and dropped, never coerced or retried here.
    #[error("invalid fill {tx_hash}: {reason}")]
    InvalidEvent { tx_hash: String, reason: String },

    /// A mutation references a position the ledger does not hold where the
    /// caller's bookkeeping requires one. Reported, never silently patched:
    /// the ledger will not invent a position to make the math work.
    #[error("inconsistent ledger state for token {token_id}: {reason}")]
    InconsistentState { token_id: String, reason: String },
}

/// Ledger mutation produced by one fill.
///
/// The store applies a delta as a single unit: a concurrent reader sees
/// either none or all of its effects, so a reverse or hedge never shows
/// the old leg closed with the new leg missing.
#[derive(Debug, Clone)]
pub enum LedgerDelta {
    /// Write one position row (open, increase, partial close).
    Upsert(Position),
    /// Delete one position row (full close).
    Remove { token_id: String },
    /// Delete one row and write another in the same unit (reverse, or a
    /// hedge that fully unwinds the opposite leg).
    Swap {
        remove_token_id: String,
        upsert: Position,
    },
    /// Write two rows in the same unit (partial hedge: the reduced
    /// opposite leg and the entered leg).
    UpsertBoth { reduced: Position, entered: Position },
}

/// Outcome of classifying one fill against the ledger.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub kind: Classification,

    /// Realized-PnL record, present exactly when `kind.realizes_pnl()`
    pub closed: Option<ClosedTrade>,

    /// Mutation for the store to apply atomically
    pub delta: LedgerDelta,
}

impl Evaluation {
    /// The position row left on the fill's own token after the delta
    /// applies, if any. Used for notification rendering.
    pub fn resulting_position(&self) -> Option<&Position> {
        match &self.delta {
            LedgerDelta::Upsert(p) => Some(p),
            LedgerDelta::Remove { .. } => None,
            LedgerDelta::Swap { upsert, .. } => Some(upsert),
            LedgerDelta::UpsertBoth { entered, .. } => Some(entered),
        }
    }
}

/// Classify one fill against the current ledger state.
///
/// Every valid fill yields exactly one classification; invalid fills are
/// rejected with [`TrackError::InvalidEvent`].
pub fn classify(ledger: &Ledger, fill: &Fill) -> Result<Evaluation, TrackError> {
    validate(fill)?;

    // Hedge check: a BUY on one outcome unwinds exposure held on the
    // market's other outcome before anything else is considered.
    if fill.side == Side::Buy {
        if let Some(opposite) = ledger.opposite_position(&fill.market_id, &fill.token_id) {
            return Ok(classify_hedge(ledger, fill, opposite));
        }
    }

    match ledger.position(&fill.token_id) {
        None => classify_flat(fill),
        Some(held) => Ok(classify_against(held, fill)),
    }
}

fn validate(fill: &Fill) -> Result<(), TrackError> {
    let reject = |reason: String| TrackError::InvalidEvent {
        tx_hash: fill.tx_hash.clone(),
        reason,
    };

    if fill.market_id.is_empty() || fill.token_id.is_empty() {
        return Err(reject("missing market or token id".to_string()));
    }
    if fill.size <= Decimal::ZERO {
        return Err(reject(format!("size must be positive, got {}", fill.size)));
    }
    if fill.price < Decimal::ZERO || fill.price > Decimal::ONE {
        return Err(reject(format!(
            "price must be within [0, 1], got {}",
            fill.price
        )));
    }
    Ok(())
}

/// No exposure anywhere on the fill's token.
fn classify_flat(fill: &Fill) -> Result<Evaluation, TrackError> {
    match fill.side {
        Side::Buy => {
            let position = Position::open(
                fill.token_id.clone(),
                fill.market_id.clone(),
                fill.outcome.clone(),
                fill.size,
                fill.price,
                Direction::Long,
                fill.timestamp,
            );
            Ok(Evaluation {
                kind: Classification::Open,
                closed: None,
                delta: LedgerDelta::Upsert(position),
            })
        }
        // SELL only ever closes or reduces; short exposure arises through
        // REVERSE, never through a standalone SELL.
        Side::Sell => Err(TrackError::InvalidEvent {
            tx_hash: fill.tx_hash.clone(),
            reason: format!("SELL of {} with no open position", fill.token_id),
        }),
    }
}

/// Same-token evaluation against the held position.
fn classify_against(held: &Position, fill: &Fill) -> Evaluation {
    let signed = match fill.side {
        Side::Buy => fill.size,
        Side::Sell => -fill.size,
    };
    let current = held.signed_size();

    // Same direction as the holding: size-weighted increase, no PnL.
    if current * signed > Decimal::ZERO {
        let mut increased = held.clone();
        increased.average_in(fill.size, fill.price, fill.timestamp);
        return Evaluation {
            kind: Classification::Increase,
            closed: None,
            delta: LedgerDelta::Upsert(increased),
        };
    }

    // Opposing fill: realize PnL on what was actually held.
    let remaining = current + signed;
    let closing_size = fill.size.min(held.size);
    let pnl = closing_size * (fill.price - held.entry_price) * held.direction.signum();

    let record = |kind: Classification, closing: Decimal, pnl: Decimal| ClosedTrade {
        market_id: held.market_id.clone(),
        token_id: held.token_id.clone(),
        outcome: held.outcome.clone(),
        kind,
        closing_size: closing,
        entry_price: held.entry_price,
        exit_price: fill.price,
        realized_pnl: pnl,
        closed_at: fill.timestamp,
    };

    if remaining.abs() <= size_epsilon() {
        return Evaluation {
            kind: Classification::FullClose,
            closed: Some(record(Classification::FullClose, closing_size, pnl)),
            delta: LedgerDelta::Remove {
                token_id: held.token_id.clone(),
            },
        };
    }

    if remaining.signum() != current.signum() {
        // Larger than the holding: the old leg closes in full and the
        // surplus opens a position pointing the other way.
        let pnl = held.size * (fill.price - held.entry_price) * held.direction.signum();
        let flipped = Position::open(
            fill.token_id.clone(),
            fill.market_id.clone(),
            fill.outcome.clone(),
            remaining.abs(),
            fill.price,
            held.direction.flipped(),
            fill.timestamp,
        );
        return Evaluation {
            kind: Classification::Reverse,
            closed: Some(record(Classification::Reverse, held.size, pnl)),
            delta: LedgerDelta::Swap {
                remove_token_id: held.token_id.clone(),
                upsert: flipped,
            },
        };
    }

    let mut reduced = held.clone();
    reduced.reduce(closing_size, fill.timestamp);
    Evaluation {
        kind: Classification::PartialClose,
        closed: Some(record(Classification::PartialClose, closing_size, pnl)),
        delta: LedgerDelta::Upsert(reduced),
    }
}

/// BUY on one outcome while holding the market's other outcome.
///
/// On a binary market the two outcome prices sum to 1.0 at settlement, so
/// unwinding one side while entering the other prices the combined position
/// against that par value rather than a single-sided entry/exit spread.
///
/// The unwound side realizes PnL on at most what was held; the bought side
/// is booked at the full traded size. The two legs therefore do not
/// conserve notional when the buy exceeds the opposite holding; this
/// mirrors the source system's bookkeeping and is pinned by tests.
fn classify_hedge(ledger: &Ledger, fill: &Fill, opposite: &Position) -> Evaluation {
    let closing_size = fill.size.min(opposite.size);
    let pnl = closing_size * (Decimal::ONE - opposite.entry_price - fill.price);

    let entered = match ledger.position(&fill.token_id) {
        Some(own) => {
            let mut increased = own.clone();
            increased.average_in(fill.size, fill.price, fill.timestamp);
            increased
        }
        None => Position::open(
            fill.token_id.clone(),
            fill.market_id.clone(),
            fill.outcome.clone(),
            fill.size,
            fill.price,
            Direction::Long,
            fill.timestamp,
        ),
    };

    let kind = if closing_size == opposite.size {
        Classification::HedgeClose
    } else {
        Classification::PartialHedge
    };

    let closed = ClosedTrade {
        market_id: opposite.market_id.clone(),
        token_id: opposite.token_id.clone(),
        outcome: opposite.outcome.clone(),
        kind,
        closing_size,
        entry_price: opposite.entry_price,
        exit_price: fill.price,
        realized_pnl: pnl,
        closed_at: fill.timestamp,
    };

    let delta = match kind {
        Classification::HedgeClose => LedgerDelta::Swap {
            remove_token_id: opposite.token_id.clone(),
            upsert: entered,
        },
        _ => {
            let mut reduced = opposite.clone();
            reduced.reduce(closing_size, fill.timestamp);
            LedgerDelta::UpsertBoth { reduced, entered }
        }
    };

    Evaluation {
        kind,
        closed: Some(closed),
        delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    const MARKET: &str = "0xmarket";
    const UP: &str = "111";
    const DOWN: &str = "222";

    fn fill(token: &str, outcome: &str, side: Side, size: Decimal, price: Decimal) -> Fill {
        Fill {
            tx_hash: format!("0x{}-{}", token, size),
            market_id: MARKET.to_string(),
            token_id: token.to_string(),
            outcome: outcome.to_string(),
            side,
            size,
            price,
            timestamp: Utc::now(),
        }
    }

    fn ledger_with_up(size: Decimal, entry: Decimal) -> Ledger {
        let mut ledger = Ledger::new();
        let open = classify(&ledger, &fill(UP, "Up", Side::Buy, size, entry)).unwrap();
        ledger.apply(&open).unwrap();
        ledger
    }

    #[test]
    fn test_open() {
        let ledger = Ledger::new();
        let eval = classify(&ledger, &fill(UP, "Up", Side::Buy, dec!(100), dec!(0.60))).unwrap();

        assert_eq!(eval.kind, Classification::Open);
        assert!(eval.closed.is_none());

        let pos = eval.resulting_position().unwrap();
        assert_eq!(pos.size, dec!(100));
        assert_eq!(pos.entry_price, dec!(0.60));
        assert_eq!(pos.direction, Direction::Long);
    }

    #[test]
    fn test_increase_averages_entry() {
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(UP, "Up", Side::Buy, dec!(50), dec!(0.65))).unwrap();

        assert_eq!(eval.kind, Classification::Increase);
        assert!(eval.closed.is_none());

        let pos = eval.resulting_position().unwrap();
        assert_eq!(pos.size, dec!(150));
        // (100*0.60 + 50*0.65) / 150 = 0.61666...
        let diff = (pos.entry_price - dec!(0.6167)).abs();
        assert!(diff < dec!(0.0001), "entry was {}", pos.entry_price);
    }

    #[test]
    fn test_full_close() {
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(UP, "Up", Side::Sell, dec!(100), dec!(0.70))).unwrap();

        assert_eq!(eval.kind, Classification::FullClose);
        assert!(matches!(eval.delta, LedgerDelta::Remove { .. }));

        let closed = eval.closed.unwrap();
        assert_eq!(closed.realized_pnl, dec!(10.00));
        assert_eq!(closed.closing_size, dec!(100));
        assert_eq!(closed.entry_price, dec!(0.60));
        assert_eq!(closed.exit_price, dec!(0.70));
    }

    #[test]
    fn test_partial_close() {
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(UP, "Up", Side::Sell, dec!(40), dec!(0.70))).unwrap();

        assert_eq!(eval.kind, Classification::PartialClose);
        assert_eq!(eval.closed.as_ref().unwrap().realized_pnl, dec!(4.00));

        let pos = eval.resulting_position().unwrap();
        assert_eq!(pos.size, dec!(60));
        assert_eq!(pos.entry_price, dec!(0.60));
        assert_eq!(pos.direction, Direction::Long);
    }

    #[test]
    fn test_reverse() {
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(UP, "Up", Side::Sell, dec!(150), dec!(0.70))).unwrap();

        assert_eq!(eval.kind, Classification::Reverse);

        let closed = eval.closed.as_ref().unwrap();
        assert_eq!(closed.closing_size, dec!(100));
        assert_eq!(closed.realized_pnl, dec!(10.00));

        let pos = eval.resulting_position().unwrap();
        assert_eq!(pos.size, dec!(50));
        assert_eq!(pos.entry_price, dec!(0.70));
        assert_eq!(pos.direction, Direction::Short);
    }

    #[test]
    fn test_hedge_close() {
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(DOWN, "Down", Side::Buy, dec!(100), dec!(0.50))).unwrap();

        assert_eq!(eval.kind, Classification::HedgeClose);

        // 100 * (1.0 - 0.60 - 0.50) = -10.00
        let closed = eval.closed.unwrap();
        assert_eq!(closed.realized_pnl, dec!(-10.00));
        assert_eq!(closed.token_id, UP);
        assert_eq!(closed.outcome, "Up");

        match &eval.delta {
            LedgerDelta::Swap {
                remove_token_id,
                upsert,
            } => {
                assert_eq!(remove_token_id, UP);
                assert_eq!(upsert.token_id, DOWN);
                assert_eq!(upsert.size, dec!(100));
                assert_eq!(upsert.entry_price, dec!(0.50));
                assert_eq!(upsert.direction, Direction::Long);
            }
            other => panic!("expected Swap, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_hedge() {
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(DOWN, "Down", Side::Buy, dec!(30), dec!(0.45))).unwrap();

        assert_eq!(eval.kind, Classification::PartialHedge);

        // 30 * (1.0 - 0.60 - 0.45) = -1.50
        let closed = eval.closed.as_ref().unwrap();
        assert_eq!(closed.realized_pnl, dec!(-1.50));
        assert_eq!(closed.closing_size, dec!(30));

        match &eval.delta {
            LedgerDelta::UpsertBoth { reduced, entered } => {
                assert_eq!(reduced.token_id, UP);
                assert_eq!(reduced.size, dec!(70));
                assert_eq!(reduced.entry_price, dec!(0.60));
                assert_eq!(entered.token_id, DOWN);
                assert_eq!(entered.size, dec!(30));
            }
            other => panic!("expected UpsertBoth, got {other:?}"),
        }
    }

    #[test]
    fn test_hedge_books_full_buy_size_past_opposite_holding() {
        // Buying more of the other outcome than was held: the unwound leg
        // realizes PnL on the held 100 only, the entered leg books all 150.
        let ledger = ledger_with_up(dec!(100), dec!(0.60));
        let eval = classify(&ledger, &fill(DOWN, "Down", Side::Buy, dec!(150), dec!(0.50))).unwrap();

        assert_eq!(eval.kind, Classification::HedgeClose);

        let closed = eval.closed.as_ref().unwrap();
        assert_eq!(closed.closing_size, dec!(100));
        assert_eq!(closed.realized_pnl, dec!(-10.00));

        let pos = eval.resulting_position().unwrap();
        assert_eq!(pos.size, dec!(150));
    }

    #[test]
    fn test_short_buy_back_closes() {
        // Build a short 50 @ 0.70 via reverse, then buy back at 0.55.
        let mut ledger = ledger_with_up(dec!(100), dec!(0.60));
        let reverse =
            classify(&ledger, &fill(UP, "Up", Side::Sell, dec!(150), dec!(0.70))).unwrap();
        ledger.apply(&reverse).unwrap();

        let eval = classify(&ledger, &fill(UP, "Up", Side::Buy, dec!(50), dec!(0.55))).unwrap();
        assert_eq!(eval.kind, Classification::FullClose);

        // Short realizes profit when exit is below entry: 50 * (0.55-0.70) * -1
        let closed = eval.closed.unwrap();
        assert_eq!(closed.realized_pnl, dec!(7.50));
    }

    #[test]
    fn test_dust_remainder_is_full_close() {
        let ledger = ledger_with_up(dec!(100.0000005), dec!(0.60));
        let eval =
            classify(&ledger, &fill(UP, "Up", Side::Sell, dec!(100.000001), dec!(0.70))).unwrap();
        assert_eq!(eval.kind, Classification::FullClose);
    }

    #[test]
    fn test_rejects_non_positive_size() {
        let ledger = Ledger::new();
        let err = classify(&ledger, &fill(UP, "Up", Side::Buy, dec!(0), dec!(0.60))).unwrap_err();
        assert!(matches!(err, TrackError::InvalidEvent { .. }));
    }

    #[test]
    fn test_rejects_price_out_of_range() {
        let ledger = Ledger::new();
        let err = classify(&ledger, &fill(UP, "Up", Side::Buy, dec!(10), dec!(1.2))).unwrap_err();
        assert!(matches!(err, TrackError::InvalidEvent { .. }));
    }

    #[test]
    fn test_rejects_sell_with_no_position() {
        let ledger = Ledger::new();
        let err = classify(&ledger, &fill(UP, "Up", Side::Sell, dec!(10), dec!(0.60))).unwrap_err();
        assert!(matches!(err, TrackError::InvalidEvent { .. }));
    }

    #[test]
    fn test_pnl_only_on_closing_kinds() {
        let mut ledger = Ledger::new();
        let fills = [
            fill(UP, "Up", Side::Buy, dec!(100), dec!(0.60)),
            fill(UP, "Up", Side::Buy, dec!(50), dec!(0.65)),
            fill(UP, "Up", Side::Sell, dec!(40), dec!(0.70)),
            fill(DOWN, "Down", Side::Buy, dec!(200), dec!(0.35)),
        ];

        for f in &fills {
            let eval = classify(&ledger, f).unwrap();
            assert_eq!(eval.kind.realizes_pnl(), eval.closed.is_some());
            ledger.apply(&eval).unwrap();
        }
    }
}
