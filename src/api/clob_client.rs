//! Polymarket CLOB client for mirroring fills as orders.
//!
//! The CLOB is Polymarket's off-chain order matching engine that settles
//! on Polygon. This client signs orders as EIP-712 typed data and submits
//! them at the source fill's price, so the mirror tracks the copied trade
//! rather than chasing the book.

use alloy_primitives::{keccak256, Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::{Fill, Side};

/// CLOB API base URL
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const ORDER_TTL_SECS: i64 = 3600;

/// CLOB API client for submitting mirror orders.
pub struct ClobClient {
    http: Client,
    signer: PrivateKeySigner,
    api_key: String,
    api_passphrase: String,
    chain_id: u64,
}

/// Order side on the CLOB wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_u8(&self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }
}

impl From<Side> for OrderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => OrderSide::Buy,
            Side::Sell => OrderSide::Sell,
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Good-til-cancelled limit order
    Gtc,
    /// Fill-or-kill market order
    Fok,
}

/// EOA signature marker for the CLOB's signatureType field.
const SIGNATURE_TYPE_EOA: u8 = 0;

/// Signed order ready for submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: OrderType,
}

/// Response from order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
}

impl ClobClient {
    /// Create a new CLOB client.
    ///
    /// # Arguments
    /// * `private_key` - Ethereum private key (hex, with or without 0x prefix)
    /// * `api_key` / `api_passphrase` - Polymarket API credentials
    /// * `chain_id` - 137 for Polygon mainnet, 80002 for Amoy testnet
    pub fn new(
        private_key: &str,
        api_key: &str,
        api_passphrase: &str,
        chain_id: u64,
    ) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            signer,
            api_key: api_key.to_string(),
            api_passphrase: api_passphrase.to_string(),
            chain_id,
        })
    }

    /// Create from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - POLYMARKET_API_KEY
    /// - POLYMARKET_API_PASSPHRASE
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    pub fn from_env() -> Result<Self> {
        let private_key =
            std::env::var("POLYMARKET_PRIVATE_KEY").context("POLYMARKET_PRIVATE_KEY not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY").context("POLYMARKET_API_KEY not set")?;
        let api_passphrase = std::env::var("POLYMARKET_API_PASSPHRASE")
            .context("POLYMARKET_API_PASSPHRASE not set")?;
        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        Self::new(&private_key, &api_key, &api_passphrase, chain_id)
    }

    /// The signing wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Submit a fill-or-kill order mirroring a source fill at its price.
    pub async fn mirror_fill(&self, fill: &Fill, size: Decimal) -> Result<OrderResponse> {
        self.place_order(
            &fill.token_id,
            fill.side.into(),
            size,
            fill.price,
            OrderType::Fok,
        )
        .await
    }

    /// Place an order with full control over parameters.
    pub async fn place_order(
        &self,
        token_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<OrderResponse> {
        let signed_order = self.build_signed_order(token_id, side, size, price).await?;

        let payload = OrderPayload {
            order: signed_order,
            owner: format!("{:?}", self.address()),
            order_type,
        };

        let url = format!("{}/order", CLOB_URL);
        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Order placement failed: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order response")
    }

    /// Build and sign an order for submission.
    async fn build_signed_order(
        &self,
        token_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<SignedOrder> {
        let maker = format!("{:?}", self.address());
        let signer = maker.clone();
        let taker = ZERO_ADDRESS.to_string();

        // For BUY the maker gives USDC and receives shares; for SELL the
        // maker gives shares and receives USDC.
        let shares = Self::to_base_units(size);
        let usdc = Self::to_base_units(size * price);
        let (maker_amount, taker_amount) = match side {
            OrderSide::Buy => (usdc, shares),
            OrderSide::Sell => (shares, usdc),
        };

        let salt = uuid::Uuid::new_v4().as_u128().to_string();
        let nonce = uuid::Uuid::new_v4().as_u128().to_string();
        let expiration = (Utc::now().timestamp() + ORDER_TTL_SECS).to_string();
        let fee_rate_bps = "0".to_string();

        let side_str = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };

        let signature = self
            .sign_order(
                &salt,
                &maker,
                &taker,
                token_id,
                &maker_amount,
                &taker_amount,
                &expiration,
                &nonce,
                &fee_rate_bps,
                side.as_u8(),
            )
            .await?;

        Ok(SignedOrder {
            salt,
            maker,
            signer,
            taker,
            token_id: token_id.to_string(),
            maker_amount,
            taker_amount,
            side: side_str.to_string(),
            expiration,
            nonce,
            fee_rate_bps,
            signature_type: SIGNATURE_TYPE_EOA,
            signature,
        })
    }

    /// Sign an order as EIP-712 typed data:
    /// keccak256("\x19\x01" || domainSeparator || structHash).
    #[allow(clippy::too_many_arguments)]
    async fn sign_order(
        &self,
        salt: &str,
        maker: &str,
        taker: &str,
        token_id: &str,
        maker_amount: &str,
        taker_amount: &str,
        expiration: &str,
        nonce: &str,
        fee_rate_bps: &str,
        side: u8,
    ) -> Result<String> {
        let type_hash = keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)"
        );

        let mut encoded = Vec::new();
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(&Self::encode_uint256(salt)?);
        encoded.extend_from_slice(&Self::encode_address(maker)?);
        encoded.extend_from_slice(&Self::encode_address(maker)?);
        encoded.extend_from_slice(&Self::encode_address(taker)?);
        encoded.extend_from_slice(&Self::encode_uint256(token_id)?);
        encoded.extend_from_slice(&Self::encode_uint256(maker_amount)?);
        encoded.extend_from_slice(&Self::encode_uint256(taker_amount)?);
        encoded.extend_from_slice(&Self::encode_uint256(expiration)?);
        encoded.extend_from_slice(&Self::encode_uint256(nonce)?);
        encoded.extend_from_slice(&Self::encode_uint256(fee_rate_bps)?);
        encoded.extend_from_slice(&Self::encode_uint8(side));
        encoded.extend_from_slice(&Self::encode_uint8(SIGNATURE_TYPE_EOA));
        let struct_hash = keccak256(&encoded);

        let domain_hash = self.domain_separator()?;

        let mut message = vec![0x19, 0x01];
        message.extend_from_slice(domain_hash.as_slice());
        message.extend_from_slice(struct_hash.as_slice());
        let final_hash = keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&final_hash)
            .await
            .context("Failed to sign order")?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    /// EIP-712 domain separator for the CTF Exchange.
    fn domain_separator(&self) -> Result<alloy_primitives::B256> {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let name_hash = keccak256(b"Polymarket CTF Exchange");
        let version_hash = keccak256(b"1");

        let mut encoded = Vec::new();
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&Self::encode_uint256(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&Self::encode_address(CTF_EXCHANGE)?);

        Ok(keccak256(&encoded))
    }

    /// Authentication headers for CLOB requests.
    fn auth_headers(&self) -> Result<reqwest::header::HeaderMap> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        let timestamp = Utc::now().timestamp().to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("poly-address"),
            HeaderValue::from_str(&format!("{:?}", self.address()))?,
        );
        headers.insert(
            HeaderName::from_static("poly-timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("poly-api-key"),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("poly-passphrase"),
            HeaderValue::from_str(&self.api_passphrase)?,
        );

        Ok(headers)
    }

    /// Convert a share or USDC amount to base units (6 decimals).
    fn to_base_units(amount: Decimal) -> String {
        let scaled = amount * Decimal::from(1_000_000u64);
        scaled
            .to_string()
            .split('.')
            .next()
            .unwrap_or("0")
            .to_string()
    }

    /// Encode an address as a 32-byte left-padded word.
    fn encode_address(addr: &str) -> Result<[u8; 32]> {
        let addr = Address::from_str(addr.strip_prefix("0x").unwrap_or(addr))?;
        let mut buf = [0u8; 32];
        buf[12..].copy_from_slice(addr.as_slice());
        Ok(buf)
    }

    /// Encode a decimal-string uint256 as a 32-byte big-endian word.
    fn encode_uint256(value: &str) -> Result<[u8; 32]> {
        let n = U256::from_str(value).unwrap_or(U256::ZERO);
        Ok(n.to_be_bytes())
    }

    /// Encode a uint8 as a 32-byte left-padded word.
    fn encode_uint8(value: u8) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[31] = value;
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_base_units() {
        assert_eq!(ClobClient::to_base_units(dec!(100.5)), "100500000");
        assert_eq!(ClobClient::to_base_units(dec!(0.000001)), "1");
    }

    #[test]
    fn test_encode_uint8() {
        let encoded = ClobClient::encode_uint8(1);
        assert_eq!(encoded[31], 1);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_buy_and_sell_amounts_swap() {
        // 200 shares at 0.50: the USDC leg is 100.
        let shares = ClobClient::to_base_units(dec!(200));
        let usdc = ClobClient::to_base_units(dec!(200) * dec!(0.50));
        assert_eq!(shares, "200000000");
        assert_eq!(usdc, "100000000");
    }
}
