//! API response types for the Polymarket Data API.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Activity entry from the /activity endpoint.
///
/// The endpoint mixes trades with splits, merges, and redemptions; the
/// `activity_type` field distinguishes them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(rename = "user", default)]
    pub proxy_wallet: String,
    #[serde(rename = "market", default)]
    pub condition_id: String,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub price: Decimal,
    pub timestamp: i64,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub title: String,
}
