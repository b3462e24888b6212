//! ExecutionGateway service - dual-mode order execution
//!
//! One gateway instance owns the order path for the process. Its mode is
//! fixed at construction: with exchange credentials it trades live, without
//! them every fill is simulated against real market prices and carried in
//! the persisted paper ledger. The kill switch gates both modes and is
//! always evaluated to completion before any order is submitted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::domain::entities::order::{Order, OrderSide};
use crate::domain::entities::position::{ExitReason, PositionSide, SimulatedPosition};
use crate::domain::entities::signal::TradeSignal;
use crate::domain::errors::{ExecutionError, ValidationError};
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::infrastructure::retry::{with_backoff, RetryPolicy};
use crate::persistence::account_ledger::{AccountLedger, LedgerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "LIVE"),
            TradingMode::Paper => write!(f, "PAPER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Asset the account is denominated in.
    pub quote_asset: String,
    /// Daily realized loss, as a fraction of balance, that trips the
    /// kill switch.
    pub max_daily_loss_fraction: f64,
    /// Fixed delay between connection attempts; the connect loop itself
    /// is unbounded.
    pub connect_retry_interval: Duration,
    /// Bounded-backoff policy for read-only market-data calls.
    pub read_retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            max_daily_loss_fraction: 0.20,
            connect_retry_interval: Duration::from_secs(5),
            read_retry: RetryPolicy::default(),
        }
    }
}

/// Result of an accepted order placement.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
    /// Simulated fill price in paper mode; the signal's reference entry
    /// price in live mode.
    pub fill_price: f64,
    pub amount: f64,
    /// Set when a live entry filled but its protective stop could not be
    /// submitted. Such positions have no broker-side stop.
    pub unprotected: bool,
}

pub struct ExecutionGateway {
    mode: TradingMode,
    client: Arc<dyn ExchangeClient>,
    ledger: Mutex<AccountLedger>,
    store: LedgerStore,
    state: Mutex<ConnectionState>,
    config: GatewayConfig,
}

impl ExecutionGateway {
    /// Load the persisted paper ledger and fix the trading mode for the
    /// life of the gateway.
    pub async fn new(
        mode: TradingMode,
        client: Arc<dyn ExchangeClient>,
        store: LedgerStore,
        initial_balance: f64,
        config: GatewayConfig,
    ) -> Self {
        let ledger = store.load_or_new(initial_balance).await;
        ExecutionGateway {
            mode,
            client,
            ledger: Mutex::new(ledger),
            store,
            state: Mutex::new(ConnectionState::Disconnected),
            config,
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Establish the exchange connection, retrying at a fixed interval
    /// until the exchange answers. This is the only unbounded retry loop
    /// in the core; an operator restarts the process if it never settles.
    pub async fn connect(&self) {
        loop {
            *self.state.lock().await = ConnectionState::Connecting;
            match self.client.ping().await {
                Ok(()) => {
                    *self.state.lock().await = ConnectionState::Connected;
                    info!(
                        exchange = self.client.name(),
                        mode = %self.mode,
                        "Exchange connection established"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        exchange = self.client.name(),
                        error = %e,
                        retry_in_secs = self.config.connect_retry_interval.as_secs(),
                        "Exchange unreachable, retrying"
                    );
                    sleep(self.config.connect_retry_interval).await;
                }
            }
        }
    }

    /// Account equity in the quote asset. Live mode asks the exchange for
    /// the free balance; paper mode derives it from the ledger. Read-only.
    pub async fn balance(&self) -> Result<f64, ExecutionError> {
        match self.mode {
            TradingMode::Live => {
                let client = &self.client;
                let asset = self.config.quote_asset.as_str();
                let balances = with_backoff(&self.config.read_retry, || {
                    client.fetch_balance(Some(asset))
                })
                .await?;
                Ok(balances.first().map(|b| b.free).unwrap_or(0.0))
            }
            TradingMode::Paper => Ok(self.ledger.lock().await.equity()),
        }
    }

    /// Daily-loss kill switch, derived fresh on every call from today's
    /// realized trades; nothing about it is separately persisted. A
    /// non-positive balance trips it unconditionally.
    pub async fn check_kill_switch(&self) -> Result<bool, ExecutionError> {
        let balance = self.balance().await?;
        if balance <= 0.0 {
            warn!(balance, "Kill switch: account balance exhausted");
            return Ok(true);
        }

        let today = Local::now().date_naive();
        let today_pnl = self.ledger.lock().await.realized_pnl_on(today);
        if today_pnl < 0.0 && today_pnl.abs() / balance >= self.config.max_daily_loss_fraction {
            warn!(
                today_pnl,
                balance,
                limit = self.config.max_daily_loss_fraction,
                "Kill switch: daily loss limit breached"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Symbols with an open simulated position, for portfolio-correlation
    /// checks. Empty in live mode, where broker-side state is the truth.
    pub async fn active_symbols(&self) -> Vec<String> {
        let ledger = self.ledger.lock().await;
        let mut symbols: Vec<String> = ledger
            .active_positions
            .iter()
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Snapshot of the current paper ledger.
    pub async fn ledger_snapshot(&self) -> AccountLedger {
        self.ledger.lock().await.clone()
    }

    /// Place an order for an admitted, sized signal.
    ///
    /// The kill-switch check completes before any order is submitted; a
    /// tripped switch suppresses the order quietly and returns `Ok(None)`.
    pub async fn place_order(
        &self,
        signal: &TradeSignal,
        amount: f64,
    ) -> Result<Option<PlacedOrder>, ExecutionError> {
        if self.check_kill_switch().await? {
            warn!(
                symbol = %signal.symbol,
                strategy = %signal.strategy,
                "Kill switch active, order suppressed"
            );
            return Ok(None);
        }

        let placed = match self.mode {
            TradingMode::Live => self.place_live_order(signal, amount).await?,
            TradingMode::Paper => self.place_paper_order(signal, amount).await?,
        };
        Ok(Some(placed))
    }

    async fn place_live_order(
        &self,
        signal: &TradeSignal,
        amount: f64,
    ) -> Result<PlacedOrder, ExecutionError> {
        let side = entry_side(signal.side);
        let entry = Order::market(signal.symbol.as_str(), side, amount)
            .map_err(ValidationError::InvalidQuantity)?;

        // Order submission is never retried: a timed-out submission may
        // still have been accepted by the exchange.
        let order_id = match self.client.create_order(&entry).await {
            Ok(order_id) => order_id,
            Err(e) => {
                error!(
                    alert = "order_submission_failed",
                    symbol = %signal.symbol,
                    side = %side,
                    amount,
                    error = %e,
                    "Entry order submission failed"
                );
                return Err(e.into());
            }
        };
        info!(
            order_id = %order_id,
            symbol = %signal.symbol,
            side = %side,
            amount,
            "Entry order submitted"
        );

        // The entry is already filled; a failed stop leg is alerted, not
        // unwound.
        let unprotected = match Order::protective_stop(
            signal.symbol.as_str(),
            side,
            amount,
            signal.stop_loss,
        ) {
            Ok(stop) => match self.client.create_order(&stop).await {
                Ok(stop_id) => {
                    info!(
                        order_id = %stop_id,
                        symbol = %signal.symbol,
                        stop_price = signal.stop_loss,
                        "Protective stop submitted"
                    );
                    false
                }
                Err(e) => {
                    error!(
                        alert = "unprotected_position",
                        entry_order_id = %order_id,
                        symbol = %signal.symbol,
                        stop_price = signal.stop_loss,
                        error = %e,
                        "Stop submission failed after fill; position has no broker-side stop"
                    );
                    true
                }
            },
            Err(e) => {
                error!(
                    alert = "unprotected_position",
                    entry_order_id = %order_id,
                    symbol = %signal.symbol,
                    error = %e,
                    "Stop order could not be built; position has no broker-side stop"
                );
                true
            }
        };

        Ok(PlacedOrder {
            order_id,
            fill_price: signal.entry_price,
            amount,
            unprotected,
        })
    }

    async fn place_paper_order(
        &self,
        signal: &TradeSignal,
        amount: f64,
    ) -> Result<PlacedOrder, ExecutionError> {
        let client = &self.client;
        let symbol = signal.symbol.as_str();
        let ticker = with_backoff(&self.config.read_retry, || client.fetch_ticker(symbol)).await?;
        let fill_price = ticker.last;

        let position = SimulatedPosition {
            id: format!(
                "sim_{}_{}_{}",
                signal.symbol,
                Utc::now().timestamp_millis(),
                rand::random::<u16>()
            ),
            strategy: signal.strategy.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            entry_price: fill_price,
            amount,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            entry_time: Utc::now(),
        };

        let order_id = position.id.clone();
        {
            let mut ledger = self.ledger.lock().await;
            ledger.open(position);
            self.persist(&ledger).await;
        }

        info!(
            order_id = %order_id,
            symbol = %signal.symbol,
            side = %signal.side,
            amount,
            fill_price,
            "Simulated fill recorded"
        );
        Ok(PlacedOrder {
            order_id,
            fill_price,
            amount,
            unprotected: false,
        })
    }

    /// Scan open simulated positions against the latest price bar and
    /// realize any crossed stop or target. A no-op in live mode, where
    /// broker-side stops own the exit logic. Positions whose price fetch
    /// fails are skipped until the next scan; re-running with no new bars
    /// changes nothing.
    ///
    /// Returns the number of positions closed.
    pub async fn monitor_open_positions(&self) -> Result<usize, ExecutionError> {
        if self.mode == TradingMode::Live {
            return Ok(0);
        }

        let open: Vec<SimulatedPosition> = self.ledger.lock().await.active_positions.clone();
        if open.is_empty() {
            return Ok(0);
        }

        let mut closed = 0usize;
        for position in open {
            let client = &self.client;
            let symbol = position.symbol.as_str();
            let candle = match with_backoff(&self.config.read_retry, || {
                client.fetch_ohlcv(symbol, "1m", 1)
            })
            .await
            {
                Ok(mut rows) => match rows.pop() {
                    Some(candle) => candle,
                    None => {
                        warn!(symbol, "Exchange returned no candle, skipping position this scan");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        symbol,
                        error = %e,
                        "Price fetch failed, skipping position this scan"
                    );
                    continue;
                }
            };

            // Stop-loss is evaluated first: when one bar crosses both
            // levels the loss exit wins.
            let exit = if position.stop_crossed(&candle) {
                Some((position.stop_loss, ExitReason::StopLoss))
            } else if position.target_crossed(&candle) {
                Some((position.take_profit, ExitReason::TakeProfit))
            } else {
                None
            };

            if let Some((exit_price, reason)) = exit {
                let mut ledger = self.ledger.lock().await;
                if let Some(active) = ledger.take_position(&position.id) {
                    let trade = active.close(exit_price, Utc::now(), reason);
                    info!(
                        id = %trade.id,
                        symbol = %trade.symbol,
                        reason = %trade.exit_reason,
                        pnl = trade.pnl,
                        "Simulated position closed"
                    );
                    ledger.realize(trade);
                    self.persist(&ledger).await;
                    closed += 1;
                }
            }
        }
        Ok(closed)
    }

    /// Best-effort ledger persistence; the in-memory ledger stays
    /// authoritative when the write fails.
    async fn persist(&self, ledger: &AccountLedger) {
        if let Err(e) = self.store.save(ledger).await {
            error!(error = %e, "Failed to persist account ledger, continuing with in-memory state");
        }
    }
}

fn entry_side(side: PositionSide) -> OrderSide {
    match side {
        PositionSide::Long => OrderSide::Buy,
        PositionSide::Short => OrderSide::Sell,
    }
}
