use std::time::Duration;

use crate::application::services::execution_gateway::GatewayConfig;
use crate::domain::services::risk_gate::RiskGateConfig;
use crate::infrastructure::retry::RetryPolicy;

/// Process configuration, loaded from the environment with validated
/// fallbacks. Invalid values are logged and replaced by defaults rather
/// than failing startup.
#[derive(Clone)]
pub struct AppConfig {
    // Lot accounting
    pub core_ratio: f64,
    pub lot_store_path: String,

    // Paper account
    pub paper_initial_balance: f64,
    pub ledger_path: String,

    // Execution
    pub quote_asset: String,
    pub max_daily_loss_fraction: f64,
    pub connect_retry_seconds: u64,
    pub read_retry_max_attempts: u32,
    pub read_retry_base_delay_ms: u64,
    pub min_order_size: f64,
    pub monitor_interval_seconds: u64,

    // Risk gate
    pub base_risk_fraction: f64,
    pub hard_correlation_cap: f64,
    pub soft_correlation_limit: f64,
    pub correlation_window_days: usize,
    pub regime_symbol: String,
    pub cache_ttl_seconds: u64,

    // Exchange credentials; absence selects paper mode
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            core_ratio: 0.4,
            lot_store_path: "data/lots.json".to_string(),

            paper_initial_balance: 1000.0,
            ledger_path: "data/paper_ledger.json".to_string(),

            quote_asset: "USDT".to_string(),
            max_daily_loss_fraction: 0.20,
            connect_retry_seconds: 5,
            read_retry_max_attempts: 4,
            read_retry_base_delay_ms: 500,
            min_order_size: 0.0001,
            monitor_interval_seconds: 60,

            base_risk_fraction: 0.02,
            hard_correlation_cap: 0.8,
            soft_correlation_limit: 0.6,
            correlation_window_days: 30,
            regime_symbol: "BTCUSDT".to_string(),
            cache_ttl_seconds: 3600,

            api_key: None,
            api_secret: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppConfig {
        let mut config = AppConfig::default();

        read_fraction("CORE_RATIO", &mut config.core_ratio, 0.0..=1.0);
        read_fraction(
            "MAX_DAILY_LOSS_FRACTION",
            &mut config.max_daily_loss_fraction,
            0.01..=1.0,
        );
        read_fraction(
            "BASE_RISK_FRACTION",
            &mut config.base_risk_fraction,
            0.001..=0.1,
        );
        read_fraction(
            "HARD_CORRELATION_CAP",
            &mut config.hard_correlation_cap,
            0.0..=1.0,
        );
        read_fraction(
            "SOFT_CORRELATION_LIMIT",
            &mut config.soft_correlation_limit,
            0.0..=1.0,
        );

        if let Ok(raw) = std::env::var("PAPER_INITIAL_BALANCE") {
            match raw.parse::<f64>() {
                Ok(value) if value > 0.0 => config.paper_initial_balance = value,
                _ => tracing::warn!(
                    %raw,
                    default = config.paper_initial_balance,
                    "Invalid PAPER_INITIAL_BALANCE, using default"
                ),
            }
        }

        if let Ok(raw) = std::env::var("MIN_ORDER_SIZE") {
            match raw.parse::<f64>() {
                Ok(value) if value > 0.0 => config.min_order_size = value,
                _ => tracing::warn!(%raw, "Invalid MIN_ORDER_SIZE, using default"),
            }
        }

        read_u64("CONNECT_RETRY_SECONDS", &mut config.connect_retry_seconds, 1, 300);
        read_u64(
            "MONITOR_INTERVAL_SECONDS",
            &mut config.monitor_interval_seconds,
            5,
            3600,
        );
        read_u64("CACHE_TTL_SECONDS", &mut config.cache_ttl_seconds, 60, 86400);
        read_u64(
            "READ_RETRY_BASE_DELAY_MS",
            &mut config.read_retry_base_delay_ms,
            10,
            10_000,
        );

        if let Ok(raw) = std::env::var("READ_RETRY_MAX_ATTEMPTS") {
            match raw.parse::<u32>() {
                Ok(value) if (1..=10).contains(&value) => config.read_retry_max_attempts = value,
                _ => tracing::warn!(%raw, "Invalid READ_RETRY_MAX_ATTEMPTS, using default"),
            }
        }

        if let Ok(raw) = std::env::var("CORRELATION_WINDOW_DAYS") {
            match raw.parse::<usize>() {
                Ok(value) if (10..=365).contains(&value) => config.correlation_window_days = value,
                _ => tracing::warn!(%raw, "Invalid CORRELATION_WINDOW_DAYS, using default"),
            }
        }

        if let Ok(value) = std::env::var("QUOTE_ASSET") {
            if !value.is_empty() {
                config.quote_asset = value;
            }
        }
        if let Ok(value) = std::env::var("REGIME_SYMBOL") {
            if !value.is_empty() {
                config.regime_symbol = value;
            }
        }
        if let Ok(value) = std::env::var("LOT_STORE_PATH") {
            if !value.is_empty() {
                config.lot_store_path = value;
            }
        }
        if let Ok(value) = std::env::var("LEDGER_PATH") {
            if !value.is_empty() {
                config.ledger_path = value;
            }
        }

        config.api_key = std::env::var("BINANCE_API_KEY").ok().filter(|v| !v.is_empty());
        config.api_secret = std::env::var("BINANCE_API_SECRET")
            .ok()
            .filter(|v| !v.is_empty());

        config
    }

    /// Whether a full credential pair is present; this fixes live mode.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.read_retry_max_attempts,
            base_delay: Duration::from_millis(self.read_retry_base_delay_ms),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            quote_asset: self.quote_asset.clone(),
            max_daily_loss_fraction: self.max_daily_loss_fraction,
            connect_retry_interval: Duration::from_secs(self.connect_retry_seconds),
            read_retry: self.retry_policy(),
        }
    }

    pub fn risk_gate_config(&self) -> RiskGateConfig {
        RiskGateConfig {
            hard_correlation_cap: self.hard_correlation_cap,
            soft_correlation_limit: self.soft_correlation_limit,
            correlation_window_days: self.correlation_window_days,
            correlation_ttl: Duration::from_secs(self.cache_ttl_seconds),
            regime_symbol: self.regime_symbol.clone(),
            regime_ttl: Duration::from_secs(self.cache_ttl_seconds),
            ..RiskGateConfig::default()
        }
    }
}

fn read_fraction(name: &str, target: &mut f64, range: std::ops::RangeInclusive<f64>) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<f64>() {
            Ok(value) if range.contains(&value) => *target = value,
            _ => tracing::warn!(
                variable = name,
                %raw,
                default = *target,
                "Invalid value, using default"
            ),
        }
    }
}

fn read_u64(name: &str, target: &mut u64, min: u64, max: u64) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<u64>() {
            Ok(value) if (min..=max).contains(&value) => *target = value,
            _ => tracing::warn!(
                variable = name,
                %raw,
                default = *target,
                "Invalid value, using default"
            ),
        }
    }
}
