//! Binance USDT-margined futures client
//!
//! REST implementation of the `ExchangeClient` port. Public market-data
//! endpoints work without credentials (paper mode still needs prices);
//! account and order endpoints require an API key pair and sign the query
//! string with HMAC-SHA256.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::info;

use crate::domain::entities::market_data::{Candle, Ticker};
use crate::domain::entities::order::{Order, OrderSide, OrderType};
use crate::domain::repositories::exchange_client::{
    AssetBalance, ExchangeClient, ExchangeError, ExchangeResult,
};

const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";

/// API key pair for signed endpoints
#[derive(Debug, Clone)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Binance client configuration
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub api_base: String,
    pub credentials: Option<BinanceCredentials>,
}

impl BinanceConfig {
    pub fn new(credentials: Option<BinanceCredentials>) -> Self {
        Self {
            api_base: BINANCE_FUTURES_API_BASE.to_string(),
            credentials,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BookTickerResponse {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct PriceTickerResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct FuturesBalanceResponse {
    asset: String,
    balance: String,
    #[serde(rename = "availableBalance")]
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
}

#[derive(Debug, Deserialize)]
struct PremiumIndexResponse {
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
}

/// Binance futures client for API interactions
pub struct BinanceClient {
    client: Client,
    config: BinanceConfig,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn credentials(&self) -> ExchangeResult<&BinanceCredentials> {
        self.config
            .credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::Authentication("no API credentials configured".to_string()))
    }

    /// HMAC-SHA256 of the query string, hex-encoded, as Binance expects.
    fn sign(secret: &str, query: &str) -> ExchangeResult<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| ExchangeError::Authentication(format!("HMAC init failed: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn timestamp_ms() -> ExchangeResult<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .map_err(|e| ExchangeError::Authentication(format!("clock error: {}", e)))
    }

    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    async fn send_signed<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(String, String)>,
    ) -> ExchangeResult<T> {
        let credentials = self.credentials()?;
        params.push(("timestamp".to_string(), Self::timestamp_ms()?.to_string()));

        let query = encode_query(&params);
        let signature = Self::sign(&credentials.api_secret, &query)?;
        let url = format!(
            "{}{}?{}&signature={}",
            self.config.api_base, path, query, signature
        );

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &credentials.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "binance-futures"
    }

    async fn ping(&self) -> ExchangeResult<()> {
        let _: Value = self.get_public("/fapi/v1/ping", &[]).await?;
        Ok(())
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let book: BookTickerResponse = self
            .get_public("/fapi/v1/ticker/bookTicker", &params)
            .await?;
        let last: PriceTickerResponse = self.get_public("/fapi/v1/ticker/price", &params).await?;

        Ok(Ticker {
            last: parse_decimal_field(&last.price, "price")?,
            bid: parse_decimal_field(&book.bid_price, "bidPrice")?,
            ask: parse_decimal_field(&book.ask_price, "askPrice")?,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("interval".to_string(), timeframe.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let rows: Vec<Value> = self.get_public("/fapi/v1/klines", &params).await?;
        rows.iter().map(parse_kline_row).collect()
    }

    async fn fetch_balance(&self, asset: Option<&str>) -> ExchangeResult<Vec<AssetBalance>> {
        let rows: Vec<FuturesBalanceResponse> = self
            .send_signed(reqwest::Method::GET, "/fapi/v2/balance", Vec::new())
            .await?;

        rows.into_iter()
            .filter(|row| asset.map_or(true, |wanted| row.asset == wanted))
            .map(|row| {
                Ok(AssetBalance {
                    free: parse_decimal_field(&row.available_balance, "availableBalance")?,
                    total: parse_decimal_field(&row.balance, "balance")?,
                    asset: row.asset,
                })
            })
            .collect()
    }

    async fn create_order(&self, order: &Order) -> ExchangeResult<String> {
        let params = order_params(order);
        let response: OrderResponse = self
            .send_signed(reqwest::Method::POST, "/fapi/v1/order", params)
            .await?;

        info!(
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity.value(),
            order_id = response.order_id,
            "Order accepted by exchange"
        );
        Ok(response.order_id.to_string())
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> ExchangeResult<f64> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let index: PremiumIndexResponse =
            self.get_public("/fapi/v1/premiumIndex", &params).await?;
        parse_decimal_field(&index.last_funding_rate, "lastFundingRate")
    }
}

/// Request parameters for the order endpoint.
fn order_params(order: &Order) -> Vec<(String, String)> {
    let mut params = vec![
        ("symbol".to_string(), order.symbol.clone()),
        (
            "side".to_string(),
            match order.side {
                OrderSide::Buy => "BUY".to_string(),
                OrderSide::Sell => "SELL".to_string(),
            },
        ),
    ];

    match order.order_type {
        OrderType::Market => params.push(("type".to_string(), "MARKET".to_string())),
        OrderType::StopMarket { stop_price } => {
            params.push(("type".to_string(), "STOP_MARKET".to_string()));
            params.push(("stopPrice".to_string(), format_decimal(stop_price)));
        }
    }

    params.push(("quantity".to_string(), format_decimal(order.quantity.value())));
    if order.reduce_only {
        params.push(("reduceOnly".to_string(), "true".to_string()));
    }
    params
}

fn encode_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Plain decimal formatting; Binance rejects scientific notation.
fn format_decimal(value: f64) -> String {
    let formatted = format!("{:.8}", value);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn parse_decimal_field(raw: &str, field: &str) -> ExchangeResult<f64> {
    raw.parse::<f64>().map_err(|_| {
        ExchangeError::MalformedResponse(format!("field {} is not numeric: {:?}", field, raw))
    })
}

/// One kline row arrives as a mixed array:
/// `[openTime, open, high, low, close, volume, closeTime, ...]` with the
/// prices quoted as strings.
fn parse_kline_row(row: &Value) -> ExchangeResult<Candle> {
    let fields = row
        .as_array()
        .ok_or_else(|| ExchangeError::MalformedResponse("kline row is not an array".to_string()))?;
    if fields.len() < 6 {
        return Err(ExchangeError::MalformedResponse(format!(
            "kline row has {} fields, expected at least 6",
            fields.len()
        )));
    }

    let open_time = fields[0].as_i64().ok_or_else(|| {
        ExchangeError::MalformedResponse("kline open time is not an integer".to_string())
    })?;
    let timestamp = parse_timestamp_ms(open_time)?;

    let number = |index: usize, name: &str| -> ExchangeResult<f64> {
        let value = &fields[index];
        if let Some(raw) = value.as_str() {
            return parse_decimal_field(raw, name);
        }
        value.as_f64().ok_or_else(|| {
            ExchangeError::MalformedResponse(format!("kline {} is not numeric", name))
        })
    };

    Ok(Candle {
        timestamp,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

fn parse_timestamp_ms(ms: i64) -> ExchangeResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        ExchangeError::MalformedResponse(format!("timestamp {} out of range", ms))
    })
}

fn map_transport_error(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() {
        ExchangeError::Timeout
    } else {
        ExchangeError::Network(e.to_string())
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> ExchangeResult<T> {
    let status = response.status();
    let body = response.text().await.map_err(map_transport_error)?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| {
            ExchangeError::MalformedResponse(format!("decode failed: {} in {:?}", e, body))
        });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ExchangeError::Authentication(body));
    }
    if status.is_client_error() {
        return Err(ExchangeError::Rejected(body));
    }
    // Gateway and exchange-side failures may clear on their own.
    Err(ExchangeError::Network(format!("HTTP {}: {}", status, body)))
}
