//! RiskGate service - correlation-based admission control, market regime
//! classification and dynamic risk sizing
//!
//! The gate answers one question for every incoming signal: may this symbol
//! join the portfolio, and at what fraction of equity. Admission looks at
//! pairwise return correlation against currently held symbols; the risk
//! fraction scales with a coarse bull/bear/sideways regime read off a
//! reference asset's daily history.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeResult};

/// Minimum aligned return observations for a usable correlation estimate.
const MIN_OBSERVATIONS: usize = 10;

/// Bounded correlation cache; pairs beyond this evict least-recently-used.
const CORRELATION_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketRegime::Bull => write!(f, "BULL"),
            MarketRegime::Bear => write!(f, "BEAR"),
            MarketRegime::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskGateConfig {
    /// Correlation above this denies admission outright.
    pub hard_correlation_cap: f64,
    /// Correlation above this admits with a reduced risk penalty.
    pub soft_correlation_limit: f64,
    /// Daily closes fetched per symbol for correlation.
    pub correlation_window_days: usize,
    /// How long a cached pairwise correlation stays valid.
    pub correlation_ttl: Duration,
    /// Reference asset whose daily history drives regime classification.
    pub regime_symbol: String,
    /// How long a regime read stays valid.
    pub regime_ttl: Duration,
    /// Clamp bounds for the dynamic risk fraction.
    pub min_risk_fraction: f64,
    pub max_risk_fraction: f64,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            hard_correlation_cap: 0.8,
            soft_correlation_limit: 0.6,
            correlation_window_days: 30,
            correlation_ttl: Duration::from_secs(3600),
            regime_symbol: "BTCUSDT".to_string(),
            regime_ttl: Duration::from_secs(3600),
            min_risk_fraction: 0.01,
            max_risk_fraction: 0.04,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub admitted: bool,
    /// Informational sizing multiplier; the caller decides whether to
    /// apply it.
    pub risk_penalty: f64,
    pub max_correlation: f64,
    /// The held symbol with the highest correlation to the candidate.
    pub most_correlated: Option<String>,
}

pub struct RiskGate {
    client: Arc<dyn ExchangeClient>,
    config: RiskGateConfig,
    correlation_cache: Mutex<LruCache<(String, String), (f64, Instant)>>,
    regime_cache: Mutex<Option<(MarketRegime, Instant)>>,
}

impl RiskGate {
    pub fn new(client: Arc<dyn ExchangeClient>, config: RiskGateConfig) -> Self {
        let capacity =
            NonZeroUsize::new(CORRELATION_CACHE_CAPACITY).expect("cache capacity is non-zero");
        RiskGate {
            client,
            config,
            correlation_cache: Mutex::new(LruCache::new(capacity)),
            regime_cache: Mutex::new(None),
        }
    }

    /// Pearson correlation of daily percentage returns between two symbols,
    /// aligned to the shorter history. Returns 0 when either side has fewer
    /// than `MIN_OBSERVATIONS` aligned returns; that is an insufficient-data
    /// fallback, not an error.
    pub async fn correlation(&self, symbol_a: &str, symbol_b: &str) -> ExchangeResult<f64> {
        if symbol_a == symbol_b {
            return Ok(1.0);
        }

        let key = pair_key(symbol_a, symbol_b);
        {
            let mut cache = self.correlation_cache.lock().await;
            if let Some((value, computed_at)) = cache.get(&key) {
                if computed_at.elapsed() < self.config.correlation_ttl {
                    return Ok(*value);
                }
            }
        }

        let value = self.compute_correlation(symbol_a, symbol_b).await?;
        self.correlation_cache
            .lock()
            .await
            .put(key, (value, Instant::now()));
        Ok(value)
    }

    async fn compute_correlation(&self, symbol_a: &str, symbol_b: &str) -> ExchangeResult<f64> {
        let window = self.config.correlation_window_days;
        let series_a = self.client.fetch_ohlcv(symbol_a, "1d", window).await?;
        let series_b = self.client.fetch_ohlcv(symbol_b, "1d", window).await?;

        let closes_a: Vec<f64> = series_a.iter().map(|c| c.close).collect();
        let closes_b: Vec<f64> = series_b.iter().map(|c| c.close).collect();

        // Align to the shorter series, keeping the most recent rows.
        let len = closes_a.len().min(closes_b.len());
        let returns_a = pct_returns(&closes_a[closes_a.len() - len..]);
        let returns_b = pct_returns(&closes_b[closes_b.len() - len..]);

        if returns_a.len() < MIN_OBSERVATIONS || returns_b.len() < MIN_OBSERVATIONS {
            debug!(
                symbol_a,
                symbol_b,
                observations = returns_a.len().min(returns_b.len()),
                "Too little overlapping history for correlation, treating as uncorrelated"
            );
            return Ok(0.0);
        }

        Ok(pearson(&returns_a, &returns_b))
    }

    /// Admission decision for a candidate symbol against the currently held
    /// set. An empty portfolio always admits at full risk.
    pub async fn admit(
        &self,
        new_symbol: &str,
        active_symbols: &[String],
    ) -> ExchangeResult<Admission> {
        let mut worst: Option<(String, f64)> = None;
        for held in active_symbols {
            if held == new_symbol {
                continue;
            }
            let correlation = self.correlation(new_symbol, held).await?;
            let is_worse = worst
                .as_ref()
                .map_or(true, |(_, current)| correlation > *current);
            if is_worse {
                worst = Some((held.clone(), correlation));
            }
        }

        let (most_correlated, max_correlation) = match worst {
            Some((symbol, value)) => (Some(symbol), value),
            None => {
                return Ok(Admission {
                    admitted: true,
                    risk_penalty: 1.0,
                    max_correlation: 0.0,
                    most_correlated: None,
                })
            }
        };

        let admission = if max_correlation > self.config.hard_correlation_cap {
            warn!(
                symbol = new_symbol,
                max_correlation,
                blocking = most_correlated.as_deref().unwrap_or(""),
                "Admission denied, portfolio correlation above hard cap"
            );
            Admission {
                admitted: false,
                risk_penalty: 0.5,
                max_correlation,
                most_correlated,
            }
        } else if max_correlation > self.config.soft_correlation_limit {
            Admission {
                admitted: true,
                risk_penalty: 0.7,
                max_correlation,
                most_correlated,
            }
        } else {
            Admission {
                admitted: true,
                risk_penalty: 1.0,
                max_correlation,
                most_correlated,
            }
        };
        Ok(admission)
    }

    /// Current market regime from the reference asset's daily history.
    /// Recomputed at most once per TTL window; falls back to sideways on
    /// fetch failure or insufficient data.
    pub async fn market_regime(&self) -> MarketRegime {
        {
            let cache = self.regime_cache.lock().await;
            if let Some((regime, computed_at)) = *cache {
                if computed_at.elapsed() < self.config.regime_ttl {
                    return regime;
                }
            }
        }

        let regime = match self.classify_regime().await {
            Ok(regime) => regime,
            Err(e) => {
                warn!(error = %e, "Regime classification failed, assuming sideways");
                MarketRegime::Sideways
            }
        };

        *self.regime_cache.lock().await = Some((regime, Instant::now()));
        regime
    }

    async fn classify_regime(&self) -> ExchangeResult<MarketRegime> {
        let candles = self
            .client
            .fetch_ohlcv(&self.config.regime_symbol, "1d", 200)
            .await?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        if closes.len() < 200 {
            debug!(
                have = closes.len(),
                "Not enough daily history for regime classification"
            );
            return Ok(MarketRegime::Sideways);
        }

        let ma50 = mean(&closes[closes.len() - 50..]);
        let ma200 = mean(&closes[closes.len() - 200..]);
        let week_ago = closes[closes.len() - 8];
        let last = closes[closes.len() - 1];
        let return_7d = (last - week_ago) / week_ago;

        let regime = if ma50 > ma200 && return_7d > 0.05 {
            MarketRegime::Bull
        } else if ma50 < ma200 && return_7d < -0.05 {
            MarketRegime::Bear
        } else {
            MarketRegime::Sideways
        };
        Ok(regime)
    }

    /// Regime- and confidence-scaled risk fraction, clamped to the
    /// configured bounds.
    pub async fn dynamic_risk(&self, base_risk: f64, confidence: Option<f64>) -> f64 {
        let regime = self.market_regime().await;
        scale_risk(
            base_risk,
            regime,
            confidence,
            self.config.min_risk_fraction,
            self.config.max_risk_fraction,
        )
    }
}

/// Unordered cache key for a symbol pair.
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Percentage returns between consecutive closes; zero closes are skipped.
fn pct_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation coefficient; 0 when either series is degenerate.
fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    let xs = &xs[..n];
    let ys = &ys[..n];

    let mean_x = mean(xs);
    let mean_y = mean(ys);

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    covariance / (var_x.sqrt() * var_y.sqrt())
}

/// Pure multiplier logic behind `dynamic_risk`.
fn scale_risk(
    base_risk: f64,
    regime: MarketRegime,
    confidence: Option<f64>,
    min: f64,
    max: f64,
) -> f64 {
    let regime_multiplier = match regime {
        MarketRegime::Bull => 1.3,
        MarketRegime::Bear => 0.6,
        MarketRegime::Sideways => 1.0,
    };
    let confidence_multiplier = match confidence {
        Some(c) if c > 0.8 => 1.2,
        Some(c) if c < 0.5 => 0.7,
        _ => 1.0,
    };
    (base_risk * regime_multiplier * confidence_multiplier).clamp(min, max)
}
