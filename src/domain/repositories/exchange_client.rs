//! Exchange Client Trait
//!
//! This module defines the `ExchangeClient` trait, the port every exchange
//! integration implements. The execution gateway and the risk gate only
//! speak this interface, which keeps them independent of any concrete
//! exchange and lets tests substitute a scripted client.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::market_data::{Candle, Ticker};
use crate::domain::entities::order::Order;

/// Common result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur during exchange operations
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Transport-level failure; the call may succeed if repeated.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time; retryable.
    #[error("Request timed out")]
    Timeout,

    /// The exchange refused the request. Never retried.
    #[error("Rejected by exchange: {0}")]
    Rejected(String),

    /// Locally detected bad parameters. Never retried.
    #[error("Invalid order parameters: {0}")]
    InvalidOrder(String),

    /// Missing or rejected credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The exchange answered with something this client cannot parse.
    #[error("Malformed exchange response: {0}")]
    MalformedResponse(String),
}

impl ExchangeError {
    /// Whether a bounded-backoff retry is appropriate.
    ///
    /// Only transport failures qualify; rejections, bad parameters and
    /// auth failures will not improve on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Network(_) | ExchangeError::Timeout)
    }
}

/// Free and total balance for one asset
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub free: f64,
    pub total: f64,
}

/// Exchange client trait providing the market-data and order capabilities
/// this core consumes
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Get the name of this exchange
    fn name(&self) -> &str;

    /// Liveness probe used by the gateway's connect loop
    async fn ping(&self) -> ExchangeResult<()>;

    /// Latest top-of-book snapshot for a symbol
    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker>;

    /// Most recent `limit` OHLCV rows for a symbol, oldest first
    ///
    /// # Arguments
    /// * `timeframe` - bar interval in exchange notation (e.g. "1m", "1d")
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Account balances, optionally filtered to one asset
    async fn fetch_balance(&self, asset: Option<&str>) -> ExchangeResult<Vec<AssetBalance>>;

    /// Submit an order and return the exchange-assigned order ID
    async fn create_order(&self, order: &Order) -> ExchangeResult<String>;

    /// Current funding rate for a perpetual symbol
    async fn fetch_funding_rate(&self, symbol: &str) -> ExchangeResult<f64>;
}
