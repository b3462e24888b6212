use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mizani::application::services::execution_gateway::{ExecutionGateway, TradingMode};
use mizani::application::services::signal_pipeline::SignalPipeline;
use mizani::config::AppConfig;
use mizani::domain::services::lot_accountant::LotAccountant;
use mizani::domain::services::position_sizer::PositionSizer;
use mizani::domain::services::risk_gate::RiskGate;
use mizani::infrastructure::binance_client::{BinanceClient, BinanceConfig, BinanceCredentials};
use mizani::persistence::account_ledger::LedgerStore;
use mizani::persistence::lot_store::LotStore;
use mizani::task_runner::{run_supervised, SupervisorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mizani=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let credentials = match (&config.api_key, &config.api_secret) {
        (Some(api_key), Some(api_secret)) => Some(BinanceCredentials {
            api_key: api_key.clone(),
            api_secret: api_secret.clone(),
        }),
        _ => None,
    };
    let mode = if credentials.is_some() {
        TradingMode::Live
    } else {
        TradingMode::Paper
    };
    info!(mode = %mode, "Starting Mizani trading core");

    let client = Arc::new(BinanceClient::new(BinanceConfig::new(credentials)));

    let accountant = LotAccountant::load(
        LotStore::new(config.lot_store_path.as_str()),
        config.core_ratio,
    )
    .await?;
    let accountant = Arc::new(Mutex::new(accountant));

    let gateway = Arc::new(
        ExecutionGateway::new(
            mode,
            client.clone(),
            LedgerStore::new(config.ledger_path.as_str()),
            config.paper_initial_balance,
            config.gateway_config(),
        )
        .await,
    );

    // Blocks until the exchange answers; an operator restart is the only
    // way out of a permanently unreachable venue.
    gateway.connect().await;

    let risk_gate = Arc::new(RiskGate::new(client.clone(), config.risk_gate_config()));

    // The pipeline is the entry point signal collaborators drive; it is
    // owned here so its services share one lifecycle with the loops below.
    let _pipeline = Arc::new(SignalPipeline::new(
        risk_gate.clone(),
        PositionSizer::new(config.min_order_size),
        gateway.clone(),
        accountant.clone(),
        config.base_risk_fraction,
    ));

    // Reconciliation loop: realize stops and targets on open simulated
    // positions.
    let monitor_gateway = gateway.clone();
    let monitor_interval = config.monitor_interval_seconds;
    tokio::spawn(async move {
        run_supervised(
            "position_monitor",
            SupervisorConfig {
                interval: Duration::from_secs(monitor_interval),
                ..Default::default()
            },
            move || {
                let gateway = monitor_gateway.clone();
                async move {
                    let closed = gateway
                        .monitor_open_positions()
                        .await
                        .map_err(|e| e.to_string())?;
                    if closed > 0 {
                        info!(closed, "Reconciliation pass realized exits");
                    }
                    Ok(())
                }
            },
        )
        .await;
    });

    // Hourly portfolio status: regime, equity and holdings.
    let status_gateway = gateway.clone();
    let status_gate = risk_gate.clone();
    let status_accountant = accountant.clone();
    tokio::spawn(async move {
        run_supervised(
            "portfolio_status",
            SupervisorConfig {
                interval: Duration::from_secs(3600),
                ..Default::default()
            },
            move || {
                let gateway = status_gateway.clone();
                let gate = status_gate.clone();
                let accountant = status_accountant.clone();
                async move {
                    let regime = gate.market_regime().await;
                    let balance = gateway.balance().await.map_err(|e| e.to_string())?;
                    let stats = accountant.lock().await.stats();
                    info!(
                        regime = %regime,
                        balance,
                        holdings = stats.total_amount,
                        invested = stats.total_invested,
                        lots = stats.lot_count,
                        "Portfolio status"
                    );
                    Ok(())
                }
            },
        )
        .await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    Ok(())
}
