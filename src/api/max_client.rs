//! MAX exchange REST client (API v3).
//!
//! Every request is signed: the JSON parameters plus `path` and a
//! millisecond `nonce` are base64-encoded into `X-MAX-PAYLOAD`, and the hex
//! HMAC-SHA256 of that payload under the API secret goes into
//! `X-MAX-SIGNATURE`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::{debug, info};

use crate::models::TradeAction;

use super::types::{MaxAccount, MaxMarket, MaxOrder, MaxTrade};
use super::{ExchangeGateway, ORDER_VOLUME_DECIMALS};

type HmacSha256 = Hmac<Sha256>;

pub const MAX_API_URL: &str = "https://max-api.maicoin.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const WALLET_TYPE: &str = "spot";

/// Client for the MAX exchange.
pub struct MaxClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl MaxClient {
    /// Create a client for the production API.
    pub fn new(api_key: &str, api_secret: &str) -> Result<Self> {
        Self::with_base_url(api_key, api_secret, MAX_API_URL.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_key: &str, api_secret: &str, base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    /// Create from `MAX_API_KEY`, `MAX_API_SECRET` and optional `MAX_API_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("MAX_API_KEY").context("MAX_API_KEY not set")?;
        let api_secret = std::env::var("MAX_API_SECRET").context("MAX_API_SECRET not set")?;
        let base_url = std::env::var("MAX_API_URL").unwrap_or_else(|_| MAX_API_URL.to_string());

        Self::with_base_url(&api_key, &api_secret, base_url)
    }

    /// All markets listed on the exchange.
    pub async fn get_markets(&self) -> Result<Vec<MaxMarket>> {
        self.request(Method::GET, "/api/v3/markets", Map::new()).await
    }

    /// Most recent public trades of a market, newest first.
    pub async fn get_trades(&self, market: &str, limit: u32) -> Result<Vec<MaxTrade>> {
        let mut params = Map::new();
        params.insert("market".into(), Value::from(market.to_lowercase()));
        params.insert("limit".into(), Value::from(limit));

        self.request(Method::GET, "/api/v3/trades", params).await
    }

    /// Spot wallet accounts.
    pub async fn get_accounts(&self) -> Result<Vec<MaxAccount>> {
        let path = format!("/api/v3/wallet/{}/accounts", WALLET_TYPE);
        self.request(Method::GET, &path, Map::new()).await
    }

    /// Submit a market order.
    pub async fn create_market_order(
        &self,
        market: &str,
        side: TradeAction,
        volume: Decimal,
    ) -> Result<MaxOrder> {
        let mut params = Map::new();
        params.insert("market".into(), Value::from(market.to_lowercase()));
        params.insert("side".into(), Value::from(side.as_str()));
        params.insert("volume".into(), Value::from(format_volume(volume)));
        params.insert("ord_type".into(), Value::from("market"));

        let path = format!("/api/v3/wallet/{}/order", WALLET_TYPE);
        self.request(Method::POST, &path, params).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Map<String, Value>,
    ) -> Result<T> {
        params.insert("nonce".into(), Value::from(Utc::now().timestamp_millis()));
        let (payload, signature) = self.sign(path, &params)?;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, method = %method, "MAX request");

        let builder = self
            .http
            .request(method.clone(), &url)
            .header("X-MAX-ACCESSKEY", &self.api_key)
            .header("X-MAX-PAYLOAD", payload)
            .header("X-MAX-SIGNATURE", signature);

        let builder = if method == Method::GET {
            let query: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| (k.clone(), value_to_query(v)))
                .collect();
            builder.query(&query)
        } else {
            builder.json(&params)
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("MAX request to {} failed", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("MAX request {} failed: {} - {}", path, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse MAX response from {}", path))
    }

    /// Build the payload and signature headers for a request.
    fn sign(&self, path: &str, params: &Map<String, Value>) -> Result<(String, String)> {
        let mut to_sign = params.clone();
        to_sign.insert("path".into(), Value::from(path));

        let json = serde_json::to_string(&to_sign)?;
        let payload = BASE64_STANDARD.encode(json.as_bytes());

        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| anyhow!("Invalid API secret: {}", e))?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok((payload, signature))
    }
}

#[async_trait]
impl ExchangeGateway for MaxClient {
    async fn current_price(&self, market: &str) -> Result<Decimal> {
        let trades = self.get_trades(market, 1).await?;
        trades
            .first()
            .map(|t| t.price)
            .ok_or_else(|| anyhow!("No recent trades for market {}", market))
    }

    async fn account_balance(&self, currency: &str) -> Result<Decimal> {
        let accounts = self.get_accounts().await?;
        let currency = currency.to_lowercase();

        Ok(accounts
            .iter()
            .find(|a| a.currency.eq_ignore_ascii_case(&currency))
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_market_order(&self, market: &str, side: TradeAction, volume: Decimal) -> Result<String> {
        let order = self.create_market_order(market, side, volume).await?;

        info!(
            order_id = order.id,
            market = %market,
            side = %side,
            volume = %volume,
            state = %order.state,
            "Market order placed"
        );
        Ok(order.id.to_string())
    }

    async fn check_connection(&self) -> Result<()> {
        let markets = self.get_markets().await?;
        if markets.is_empty() {
            anyhow::bail!("MAX returned no markets");
        }
        Ok(())
    }
}

/// Format an order volume with at most 16 decimals and no trailing zeros.
pub fn format_volume(volume: Decimal) -> String {
    volume.round_dp(ORDER_VOLUME_DECIMALS).normalize().to_string()
}

fn value_to_query(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
