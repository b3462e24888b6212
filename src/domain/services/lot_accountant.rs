//! LotAccountant service - lot-based cost-basis tracking with a core/trade
//! split and highest-cost-first liquidation

use tracing::{error, info};

use crate::domain::entities::lot::{Lot, LotCategory};
use crate::domain::errors::{LedgerError, ValidationError};
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use crate::persistence::lot_store::LotStore;

/// Tolerance for float noise when comparing lot amounts.
const AMOUNT_EPSILON: f64 = 1e-9;

/// One consumed slice of a trade lot in a liquidation.
#[derive(Debug, Clone, PartialEq)]
pub struct SoldPortion {
    pub amount: f64,
    pub lot_price: f64,
    pub revenue: f64,
    pub cost_basis: f64,
}

/// Outcome of a highest-cost-first liquidation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationReport {
    pub sold_portions: Vec<SoldPortion>,
    pub total_revenue: f64,
    pub total_profit: f64,
    /// Average cost basis of the amount sold.
    pub avg_sell_cost: f64,
}

/// Aggregated holdings derived from the active lot set. Never stored;
/// recomputed on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingStats {
    pub total_amount: f64,
    pub core_amount: f64,
    pub trade_amount: f64,
    pub core_avg_cost: f64,
    pub trade_avg_cost: f64,
    pub overall_avg_cost: f64,
    pub total_invested: f64,
    pub lot_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnrealizedPnl {
    pub current_value: f64,
    pub pnl: f64,
    pub roi_pct: f64,
}

/// Owner of the lot set. Every buy appends lots, every liquidation consumes
/// trade lots from the most expensive down, and each successful mutation is
/// persisted through the lot store.
pub struct LotAccountant {
    core_ratio: f64,
    lots: Vec<Lot>,
    store: LotStore,
}

impl LotAccountant {
    /// Load persisted lots. `core_ratio` is the fraction of every non-forced
    /// buy allocated to the never-sold core bucket.
    pub async fn load(store: LotStore, core_ratio: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&core_ratio) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "core_ratio {} must be within [0, 1]",
                core_ratio
            )));
        }
        let lots = store.load_or_empty().await;
        Ok(LotAccountant {
            core_ratio,
            lots,
            store,
        })
    }

    pub fn core_ratio(&self) -> f64 {
        self.core_ratio
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    /// Sum of amounts currently held in trade lots.
    pub fn trade_amount(&self) -> f64 {
        self.lots
            .iter()
            .filter(|lot| lot.category == LotCategory::Trade)
            .map(|lot| lot.amount)
            .sum()
    }

    /// Record a purchase. Without a forced category the amount is split into
    /// a core and a trade lot by the configured ratio; a forced category
    /// creates a single lot and exists for importing pre-existing holdings.
    pub async fn record_buy(
        &mut self,
        amount: f64,
        price: f64,
        note: &str,
        forced_category: Option<LotCategory>,
    ) -> Result<Vec<Lot>, LedgerError> {
        let amount = Quantity::positive(amount).map_err(ValidationError::InvalidQuantity)?;
        let price = Price::positive(price).map_err(ValidationError::InvalidPrice)?;

        let created = match forced_category {
            Some(category) => vec![Lot::new(amount.value(), price.value(), category, note)],
            None => {
                let (core, trade) = amount
                    .split(self.core_ratio)
                    .map_err(ValidationError::InvalidQuantity)?;
                vec![
                    Lot::new(core.value(), price.value(), LotCategory::Core, note),
                    Lot::new(trade.value(), price.value(), LotCategory::Trade, note),
                ]
            }
        };

        self.lots.extend(created.iter().cloned());
        info!(
            amount = amount.value(),
            price = price.value(),
            lots = created.len(),
            "Recorded buy"
        );
        self.persist().await;
        Ok(created)
    }

    /// Sell `amount` out of the trade allocation, consuming the most
    /// expensive lots first (ties broken by insertion order).
    ///
    /// Fails closed with `InsufficientLots` when the trade allocation does
    /// not cover the request; no lot is touched in that case.
    pub async fn liquidate_highest_cost(
        &mut self,
        amount: f64,
        current_price: f64,
    ) -> Result<LiquidationReport, LedgerError> {
        let requested = Quantity::positive(amount).map_err(ValidationError::InvalidQuantity)?;
        let price = Price::positive(current_price).map_err(ValidationError::InvalidPrice)?;

        let available = self.trade_amount();
        if requested.value() > available + AMOUNT_EPSILON {
            return Err(LedgerError::InsufficientLots {
                requested: requested.value(),
                available,
            });
        }

        // Stable sort by descending price keeps insertion order for ties.
        let mut order: Vec<usize> = (0..self.lots.len())
            .filter(|&i| self.lots[i].category == LotCategory::Trade)
            .collect();
        order.sort_by(|&a, &b| {
            self.lots[b]
                .price
                .partial_cmp(&self.lots[a].price)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut remaining = requested.value();
        let mut portions = Vec::new();
        for index in order {
            if remaining <= AMOUNT_EPSILON {
                break;
            }
            let lot = &mut self.lots[index];
            if lot.amount <= AMOUNT_EPSILON {
                continue;
            }
            let take = remaining.min(lot.amount);
            portions.push(SoldPortion {
                amount: take,
                lot_price: lot.price,
                revenue: take * price.value(),
                cost_basis: take * lot.price,
            });
            remaining -= take;

            if take >= lot.amount - AMOUNT_EPSILON {
                // Fully consumed: keep the lot as an immutable audit record.
                lot.category = LotCategory::Sold;
            } else {
                lot.amount -= take;
            }
        }

        let total_revenue: f64 = portions.iter().map(|p| p.revenue).sum();
        let total_cost: f64 = portions.iter().map(|p| p.cost_basis).sum();
        let report = LiquidationReport {
            sold_portions: portions,
            total_revenue,
            total_profit: total_revenue - total_cost,
            avg_sell_cost: total_cost / requested.value(),
        };

        info!(
            amount = requested.value(),
            price = price.value(),
            revenue = report.total_revenue,
            profit = report.total_profit,
            "Liquidated trade lots highest-cost-first"
        );
        self.persist().await;
        Ok(report)
    }

    /// Current holdings aggregated per category. Pure; no side effects.
    pub fn stats(&self) -> HoldingStats {
        let mut core_amount = 0.0;
        let mut core_cost = 0.0;
        let mut trade_amount = 0.0;
        let mut trade_cost = 0.0;
        let mut lot_count = 0;

        for lot in self.lots.iter().filter(|l| l.is_active()) {
            lot_count += 1;
            match lot.category {
                LotCategory::Core => {
                    core_amount += lot.amount;
                    core_cost += lot.cost_basis();
                }
                LotCategory::Trade => {
                    trade_amount += lot.amount;
                    trade_cost += lot.cost_basis();
                }
                LotCategory::Sold => {}
            }
        }

        let total_amount = core_amount + trade_amount;
        let total_invested = core_cost + trade_cost;
        HoldingStats {
            total_amount,
            core_amount,
            trade_amount,
            core_avg_cost: weighted_avg(core_cost, core_amount),
            trade_avg_cost: weighted_avg(trade_cost, trade_amount),
            overall_avg_cost: weighted_avg(total_invested, total_amount),
            total_invested,
            lot_count,
        }
    }

    /// Mark-to-market of current holdings against one price.
    pub fn unrealized_pnl(&self, current_price: f64) -> UnrealizedPnl {
        let stats = self.stats();
        let current_value = stats.total_amount * current_price;
        let pnl = current_value - stats.total_invested;
        let roi_pct = if stats.total_invested > 0.0 {
            pnl / stats.total_invested * 100.0
        } else {
            0.0
        };
        UnrealizedPnl {
            current_value,
            pnl,
            roi_pct,
        }
    }

    /// Best-effort persistence; the in-memory lot set stays authoritative
    /// when the write fails.
    async fn persist(&self) {
        if let Err(e) = self.store.save(self.core_ratio, &self.lots).await {
            error!(error = %e, "Failed to persist lot book, continuing with in-memory state");
        }
    }
}

fn weighted_avg(cost: f64, amount: f64) -> f64 {
    if amount > 0.0 {
        cost / amount
    } else {
        0.0
    }
}
