//! Telegram notification sink.
//!
//! Renders classification events into human-readable alerts. Send
//! failures are logged as warnings and never block fill processing.

use serde_json::json;
use tracing::warn;

use crate::models::Fill;
use crate::trading::Evaluation;

/// Telegram notification service.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Send a Telegram message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    warn!(
                        status = %resp.status(),
                        "Telegram sendMessage returned non-2xx"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

/// Render one processed fill and its classification.
pub fn format_classification(fill: &Fill, evaluation: &Evaluation) -> String {
    let mut lines = vec![
        format!("*{}* {} {}", evaluation.kind.as_str(), fill.side.as_str(), fill.outcome),
        format!("Market: `{}`", shorten(&fill.market_id)),
        format!("Fill: {} @ {}", fill.size.round_dp(2), fill.price),
    ];

    if let Some(closed) = &evaluation.closed {
        lines.push(format!(
            "Closed: {} {} (entry {}, exit {})",
            closed.closing_size.round_dp(2),
            closed.outcome,
            closed.entry_price.round_dp(4),
            closed.exit_price.round_dp(4),
        ));
        lines.push(format!("Realized PnL: ${}", closed.realized_pnl.round_dp(2)));
    }

    match evaluation.resulting_position() {
        Some(position) => lines.push(format!(
            "Position: {} {} {} @ {}",
            position.direction.as_str(),
            position.size.round_dp(2),
            position.outcome,
            position.entry_price.round_dp(4),
        )),
        None => lines.push("Position: flat".to_string()),
    }

    lines.join("\n")
}

fn shorten(id: &str) -> &str {
    &id[..16.min(id.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use crate::trading::{classify, Ledger};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn fill(side: Side, size: rust_decimal::Decimal, price: rust_decimal::Decimal) -> Fill {
        Fill {
            tx_hash: "0xabc".to_string(),
            market_id: "0xmarket".to_string(),
            token_id: "111".to_string(),
            outcome: "Up".to_string(),
            side,
            size,
            price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_open_message_has_no_pnl_line() {
        let ledger = Ledger::new();
        let buy = fill(Side::Buy, dec!(100), dec!(0.60));
        let eval = classify(&ledger, &buy).unwrap();

        let message = format_classification(&buy, &eval);
        assert!(message.starts_with("*OPEN*"));
        assert!(!message.contains("Realized PnL"));
        assert!(message.contains("Position: LONG 100"));
    }

    #[test]
    fn test_full_close_message_reports_pnl_and_flat() {
        let mut ledger = Ledger::new();
        let buy = fill(Side::Buy, dec!(100), dec!(0.60));
        ledger.apply(&classify(&ledger, &buy).unwrap()).unwrap();

        let sell = fill(Side::Sell, dec!(100), dec!(0.70));
        let eval = classify(&ledger, &sell).unwrap();

        let message = format_classification(&sell, &eval);
        assert!(message.starts_with("*FULL_CLOSE*"));
        assert!(message.contains("Realized PnL: $10.00"));
        assert!(message.contains("Position: flat"));
    }
}
