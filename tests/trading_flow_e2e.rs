//! End-to-end tests for the trading core: signal admission, sizing,
//! paper execution, position reconciliation and lot accounting, all
//! against a scripted exchange.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use mizani::application::services::execution_gateway::{
    ExecutionGateway, GatewayConfig, TradingMode,
};
use mizani::application::services::signal_pipeline::{SignalOutcome, SignalPipeline};
use mizani::domain::entities::lot::LotCategory;
use mizani::domain::entities::market_data::{Candle, Ticker};
use mizani::domain::entities::order::Order;
use mizani::domain::entities::position::{ExitReason, PositionSide};
use mizani::domain::entities::signal::TradeSignal;
use mizani::domain::repositories::exchange_client::{
    AssetBalance, ExchangeClient, ExchangeError, ExchangeResult,
};
use mizani::domain::services::lot_accountant::LotAccountant;
use mizani::domain::services::position_sizer::PositionSizer;
use mizani::domain::services::risk_gate::{RiskGate, RiskGateConfig};
use mizani::infrastructure::retry::RetryPolicy;
use mizani::persistence::account_ledger::LedgerStore;
use mizani::persistence::lot_store::LotStore;

/// Scripted exchange: fixed tickers and daily closes, mutable latest bars.
struct ScriptedExchange {
    tickers: HashMap<String, f64>,
    daily_closes: HashMap<String, Vec<f64>>,
    bars: std::sync::Mutex<HashMap<String, (f64, f64)>>,
}

impl ScriptedExchange {
    fn new() -> Self {
        Self {
            tickers: HashMap::new(),
            daily_closes: HashMap::new(),
            bars: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn with_ticker(mut self, symbol: &str, last: f64) -> Self {
        self.tickers.insert(symbol.to_string(), last);
        self
    }

    fn with_daily_closes(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.daily_closes.insert(symbol.to_string(), closes);
        self
    }

    fn set_bar(&self, symbol: &str, low: f64, high: f64) {
        self.bars
            .lock()
            .unwrap()
            .insert(symbol.to_string(), (low, high));
    }

    fn candle(low: f64, high: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: (low + high) / 2.0,
            high,
            low,
            close: (low + high) / 2.0,
            volume: 10.0,
        }
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ping(&self) -> ExchangeResult<()> {
        Ok(())
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let last = self
            .tickers
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Network(format!("no ticker for {}", symbol)))?;
        Ok(Ticker {
            last,
            bid: last - 0.5,
            ask: last + 0.5,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        if timeframe == "1d" {
            let closes = self
                .daily_closes
                .get(symbol)
                .ok_or_else(|| ExchangeError::Network(format!("no history for {}", symbol)))?;
            let start = closes.len().saturating_sub(limit);
            return Ok(closes[start..]
                .iter()
                .map(|&close| Candle {
                    timestamp: Utc::now(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                })
                .collect());
        }

        let bars = self.bars.lock().unwrap();
        let (low, high) = bars
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Network(format!("no bar for {}", symbol)))?;
        Ok(vec![Self::candle(low, high)])
    }

    async fn fetch_balance(&self, asset: Option<&str>) -> ExchangeResult<Vec<AssetBalance>> {
        Ok(vec![AssetBalance {
            asset: asset.unwrap_or("USDT").to_string(),
            free: 10_000.0,
            total: 10_000.0,
        }])
    }

    async fn create_order(&self, order: &Order) -> ExchangeResult<String> {
        Ok(format!("live_{}", order.symbol))
    }

    async fn fetch_funding_rate(&self, _symbol: &str) -> ExchangeResult<f64> {
        Ok(0.0001)
    }
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mizani_e2e_{}_{}.json", tag, std::process::id()))
}

fn fresh_store(tag: &str) -> (LedgerStore, PathBuf) {
    let path = temp_path(tag);
    let _ = std::fs::remove_file(&path);
    (LedgerStore::new(&path), path)
}

fn quick_gateway_config() -> GatewayConfig {
    GatewayConfig {
        read_retry: RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
        },
        ..Default::default()
    }
}

async fn fresh_accountant(tag: &str, core_ratio: f64) -> (Arc<Mutex<LotAccountant>>, PathBuf) {
    let path = temp_path(tag);
    let _ = std::fs::remove_file(&path);
    let accountant = LotAccountant::load(LotStore::new(&path), core_ratio)
        .await
        .unwrap();
    (Arc::new(Mutex::new(accountant)), path)
}

fn long_signal(symbol: &str) -> TradeSignal {
    TradeSignal::new(symbol, PositionSide::Long, 50000.0, 48000.0, 55000.0, "breakout").unwrap()
}

/// A price path whose returns vary, long enough for correlation windows.
fn varied_closes(scale: f64) -> Vec<f64> {
    let mut closes = Vec::new();
    let mut value = 100.0 * scale;
    for i in 0..40 {
        closes.push(value);
        value *= 1.0 + 0.01 * ((i % 5) as f64 - 2.0);
    }
    closes
}

#[tokio::test]
async fn test_core_trade_split_and_hifo_liquidation() {
    let (accountant, path) = fresh_accountant("hifo", 0.4).await;
    let mut acc = accountant.lock().await;

    acc.record_buy(1.0, 20000.0, "dca", None).await.unwrap();
    acc.record_buy(1.0, 60000.0, "dca", None).await.unwrap();

    let stats = acc.stats();
    assert!((stats.core_amount - 0.8).abs() < 1e-9);
    assert!((stats.trade_amount - 1.2).abs() < 1e-9);
    assert!((stats.core_avg_cost - 40000.0).abs() < 1e-6);
    assert!((stats.trade_avg_cost - 40000.0).abs() < 1e-6);

    let report = acc.liquidate_highest_cost(0.5, 72000.0).await.unwrap();
    assert!((report.total_profit - 6000.0).abs() < 1e-6);
    assert!((report.avg_sell_cost - 60000.0).abs() < 1e-6);

    // The cheap trade lot was untouched.
    let stats = acc.stats();
    assert!((stats.trade_amount - 0.7).abs() < 1e-9);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_paper_fill_stop_exit_and_kill_switch() {
    let exchange = Arc::new(ScriptedExchange::new().with_ticker("BTCUSDT", 50000.0));
    let (store, ledger_path) = fresh_store("killswitch");
    let gateway = ExecutionGateway::new(
        TradingMode::Paper,
        exchange.clone(),
        store,
        1000.0,
        quick_gateway_config(),
    )
    .await;

    // Fill 0.125 BTC at 50000 with a stop at 48000: the stop exit loses 250.
    let placed = gateway
        .place_order(&long_signal("BTCUSDT"), 0.125)
        .await
        .unwrap()
        .expect("order should be placed");
    assert_eq!(placed.fill_price, 50000.0);

    exchange.set_bar("BTCUSDT", 47500.0, 50500.0);
    assert_eq!(gateway.monitor_open_positions().await.unwrap(), 1);

    let ledger = gateway.ledger_snapshot().await;
    assert_eq!(ledger.history.len(), 1);
    assert_eq!(ledger.history[0].exit_reason, ExitReason::StopLoss);
    assert!((ledger.total_pnl + 250.0).abs() < 1e-9);
    assert_eq!(gateway.balance().await.unwrap(), 750.0);

    // 250 lost today against 750 equity is past the 20% daily limit.
    assert!(gateway.check_kill_switch().await.unwrap());
    let suppressed = gateway
        .place_order(&long_signal("BTCUSDT"), 0.01)
        .await
        .unwrap();
    assert!(suppressed.is_none());

    let _ = std::fs::remove_file(&ledger_path);
}

#[tokio::test]
async fn test_short_position_take_profit_exit() {
    let exchange = Arc::new(ScriptedExchange::new().with_ticker("ETHUSDT", 3000.0));
    let (store, ledger_path) = fresh_store("short_tp");
    let gateway = ExecutionGateway::new(
        TradingMode::Paper,
        exchange.clone(),
        store,
        1000.0,
        quick_gateway_config(),
    )
    .await;

    let signal =
        TradeSignal::new("ETHUSDT", PositionSide::Short, 3000.0, 3150.0, 2700.0, "fade").unwrap();
    gateway.place_order(&signal, 1.0).await.unwrap();

    // The bar touches the target but not the stop.
    exchange.set_bar("ETHUSDT", 2690.0, 2710.0);
    assert_eq!(gateway.monitor_open_positions().await.unwrap(), 1);

    let ledger = gateway.ledger_snapshot().await;
    assert_eq!(ledger.history[0].exit_reason, ExitReason::TakeProfit);
    assert_eq!(ledger.history[0].exit_price, 2700.0);
    // (3000 - 2700) * 1.0
    assert!((ledger.history[0].pnl - 300.0).abs() < 1e-9);

    let _ = std::fs::remove_file(&ledger_path);
}

#[tokio::test]
async fn test_pipeline_sizes_executes_and_records_lot() {
    let exchange = Arc::new(
        ScriptedExchange::new()
            .with_ticker("BTCUSDT", 50000.0)
            .with_daily_closes("BTCUSDT", varied_closes(1.0)),
    );
    let (store, ledger_path) = fresh_store("pipeline");
    let (accountant, lot_path) = fresh_accountant("pipeline_lots", 0.4).await;

    let gateway = Arc::new(
        ExecutionGateway::new(
            TradingMode::Paper,
            exchange.clone(),
            store,
            1000.0,
            quick_gateway_config(),
        )
        .await,
    );
    let risk_gate = Arc::new(RiskGate::new(exchange.clone(), RiskGateConfig::default()));
    let pipeline = SignalPipeline::new(
        risk_gate,
        PositionSizer::new(0.0001),
        gateway.clone(),
        accountant.clone(),
        0.02,
    );

    let outcome = pipeline.handle(&long_signal("BTCUSDT"), None).await.unwrap();
    let (order, risk_fraction) = match outcome {
        SignalOutcome::Executed {
            order,
            risk_fraction,
        } => (order, risk_fraction),
        other => panic!("expected execution, got {:?}", other),
    };

    // Sideways regime (short history), no confidence: base risk unchanged.
    assert!((risk_fraction - 0.02).abs() < 1e-12);
    // 1000 * 0.02 / (50000 - 48000) = 0.01
    assert!((order.amount - 0.01).abs() < 1e-12);
    assert_eq!(order.fill_price, 50000.0);

    // The buy landed in the lot book, split 0.4 core / 0.6 trade.
    let acc = accountant.lock().await;
    let stats = acc.stats();
    assert!((stats.total_amount - 0.01).abs() < 1e-12);
    assert!((stats.core_amount - 0.004).abs() < 1e-12);
    assert!((stats.trade_amount - 0.006).abs() < 1e-12);
    assert_eq!(
        acc.lots()
            .iter()
            .filter(|l| l.category == LotCategory::Core)
            .count(),
        1
    );

    let _ = std::fs::remove_file(&ledger_path);
    let _ = std::fs::remove_file(&lot_path);
}

#[tokio::test]
async fn test_pipeline_denies_correlated_symbol() {
    // WBTC tracks BTC tick for tick; the correlation gate must refuse it.
    let exchange = Arc::new(
        ScriptedExchange::new()
            .with_ticker("BTCUSDT", 50000.0)
            .with_ticker("WBTCUSDT", 5000.0)
            .with_daily_closes("BTCUSDT", varied_closes(1.0))
            .with_daily_closes("WBTCUSDT", varied_closes(0.1)),
    );
    let (store, ledger_path) = fresh_store("denied");
    let (accountant, lot_path) = fresh_accountant("denied_lots", 0.4).await;

    let gateway = Arc::new(
        ExecutionGateway::new(
            TradingMode::Paper,
            exchange.clone(),
            store,
            1000.0,
            quick_gateway_config(),
        )
        .await,
    );
    let risk_gate = Arc::new(RiskGate::new(exchange.clone(), RiskGateConfig::default()));
    let pipeline = SignalPipeline::new(
        risk_gate,
        PositionSizer::new(0.0001),
        gateway.clone(),
        accountant,
        0.02,
    );

    // First position admits freely into an empty portfolio.
    let first = pipeline.handle(&long_signal("BTCUSDT"), None).await.unwrap();
    assert!(matches!(first, SignalOutcome::Executed { .. }));

    // The twin symbol is denied on correlation.
    let second = pipeline
        .handle(&long_signal("WBTCUSDT"), None)
        .await
        .unwrap();
    match second {
        SignalOutcome::Denied {
            max_correlation,
            most_correlated,
        } => {
            assert!(max_correlation > 0.8);
            assert_eq!(most_correlated.as_deref(), Some("BTCUSDT"));
        }
        other => panic!("expected denial, got {:?}", other),
    }

    // Nothing was opened for the denied signal.
    assert_eq!(gateway.ledger_snapshot().await.active_positions.len(), 1);

    let _ = std::fs::remove_file(&ledger_path);
    let _ = std::fs::remove_file(&lot_path);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let exchange = Arc::new(ScriptedExchange::new().with_ticker("BTCUSDT", 50000.0));
    let path = temp_path("restart");
    let _ = std::fs::remove_file(&path);

    {
        let gateway = ExecutionGateway::new(
            TradingMode::Paper,
            exchange.clone(),
            LedgerStore::new(&path),
            1000.0,
            quick_gateway_config(),
        )
        .await;
        gateway
            .place_order(&long_signal("BTCUSDT"), 0.01)
            .await
            .unwrap();
    }

    // A new process picks the open position back up and can still exit it.
    let gateway = ExecutionGateway::new(
        TradingMode::Paper,
        exchange.clone(),
        LedgerStore::new(&path),
        1000.0,
        quick_gateway_config(),
    )
    .await;
    assert_eq!(gateway.ledger_snapshot().await.active_positions.len(), 1);

    exchange.set_bar("BTCUSDT", 49000.0, 55500.0);
    assert_eq!(gateway.monitor_open_positions().await.unwrap(), 1);
    let ledger = gateway.ledger_snapshot().await;
    assert_eq!(ledger.history[0].exit_reason, ExitReason::TakeProfit);
    // (55000 - 50000) * 0.01
    assert!((ledger.total_pnl - 50.0).abs() < 1e-9);

    let _ = std::fs::remove_file(&path);
}
