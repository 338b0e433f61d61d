//! Polymarket Data API client: the fill feed for the target wallet.
//!
//! Polls the /activity endpoint for TRADE entries newer than the last seen
//! timestamp, drops anything already processed, and hands back typed fills
//! oldest first so downstream classification sees them in chronological
//! order.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backoff::ExponentialBackoff;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::models::{Fill, Side};

use super::types::ActivityResponse;

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(60);

/// Client for the Polymarket Data API (read-only operations).
pub struct FeedClient {
    client: Client,
    base_url: String,
}

impl FeedClient {
    /// Create a new feed client with default settings.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: DATA_API_BASE.to_string(),
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the target wallet's new fills since `start`, oldest first.
    ///
    /// Transaction hashes in `seen` are skipped. Transient HTTP failures
    /// and 429 responses are retried with exponential backoff before
    /// giving up.
    pub async fn fetch_fills_since(
        &self,
        wallet: &str,
        start: i64,
        seen: &HashSet<String>,
    ) -> Result<Vec<Fill>> {
        let url = format!(
            "{}/activity?user={}&type=TRADE&start={}&sortBy=TIMESTAMP&sortDirection=DESC",
            self.base_url,
            wallet.to_lowercase(),
            start
        );

        debug!(url = %url, "Fetching activity");

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..ExponentialBackoff::default()
        };

        let activities: Vec<ActivityResponse> = backoff::future::retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow!(e)))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                warn!("Rate limited by data API, backing off");
                return Err(backoff::Error::transient(anyhow!("rate limited")));
            }
            if response.status().is_server_error() {
                return Err(backoff::Error::transient(anyhow!(
                    "activity request failed: {}",
                    response.status()
                )));
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(anyhow!(
                    "activity request failed: {status} - {body}"
                )));
            }

            response
                .json::<Vec<ActivityResponse>>()
                .await
                .map_err(|e| backoff::Error::permanent(anyhow!(e)))
        })
        .await?;

        let mut fills: Vec<Fill> = activities
            .into_iter()
            .filter_map(|activity| parse_activity(wallet, &activity, seen))
            .collect();

        // The endpoint returns newest first; classification needs
        // chronological order.
        fills.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        if !fills.is_empty() {
            debug!(count = fills.len(), "Fetched new fills");
        }

        Ok(fills)
    }
}

/// Convert one activity entry into a fill, or skip it.
fn parse_activity(
    wallet: &str,
    activity: &ActivityResponse,
    seen: &HashSet<String>,
) -> Option<Fill> {
    if activity.activity_type != "TRADE" {
        return None;
    }
    if activity.transaction_hash.is_empty() || seen.contains(&activity.transaction_hash) {
        return None;
    }
    if !activity.proxy_wallet.eq_ignore_ascii_case(wallet) {
        return None;
    }

    let side = match activity.side.to_uppercase().as_str() {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => {
            warn!(side = %other, tx = %activity.transaction_hash, "Unknown fill side");
            return None;
        }
    };

    let timestamp = Utc.timestamp_opt(activity.timestamp, 0).single()?;

    Some(Fill {
        tx_hash: activity.transaction_hash.clone(),
        market_id: activity.condition_id.clone(),
        token_id: activity.asset.clone(),
        outcome: activity.outcome.clone(),
        side,
        size: activity.size,
        price: activity.price,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const WALLET: &str = "0xEffCc79a8572940cEE2238b44eAc89F2C48fda88";

    fn activity(kind: &str, side: &str, tx: &str) -> ActivityResponse {
        ActivityResponse {
            activity_type: kind.to_string(),
            proxy_wallet: WALLET.to_lowercase(),
            condition_id: "0xmarket".to_string(),
            asset: "111".to_string(),
            outcome: "Up".to_string(),
            side: side.to_string(),
            size: dec!(100),
            price: dec!(0.60),
            timestamp: 1_700_000_000,
            transaction_hash: tx.to_string(),
            title: String::new(),
        }
    }

    #[test]
    fn test_parses_trade_activity() {
        let fill = parse_activity(WALLET, &activity("TRADE", "BUY", "0x1"), &HashSet::new());
        let fill = fill.expect("trade should parse");
        assert_eq!(fill.side, Side::Buy);
        assert_eq!(fill.size, dec!(100));
        assert_eq!(fill.token_id, "111");
    }

    #[test]
    fn test_skips_non_trade_activity() {
        let seen = HashSet::new();
        assert!(parse_activity(WALLET, &activity("REDEEM", "BUY", "0x1"), &seen).is_none());
    }

    #[test]
    fn test_skips_seen_hashes() {
        let mut seen = HashSet::new();
        seen.insert("0x1".to_string());
        assert!(parse_activity(WALLET, &activity("TRADE", "BUY", "0x1"), &seen).is_none());
    }

    #[test]
    fn test_skips_other_wallets() {
        let seen = HashSet::new();
        let mut entry = activity("TRADE", "BUY", "0x1");
        entry.proxy_wallet = "0xother".to_string();
        assert!(parse_activity(WALLET, &entry, &seen).is_none());
    }

    #[test]
    fn test_skips_unknown_side() {
        let seen = HashSet::new();
        assert!(parse_activity(WALLET, &activity("TRADE", "MERGE", "0x1"), &seen).is_none());
    }
}
