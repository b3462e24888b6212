use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allocation bucket a lot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LotCategory {
    /// Long-term allocation, never liquidated by the trading engine.
    Core,
    /// Tactical allocation, eligible for highest-cost-first liquidation.
    Trade,
    /// Fully consumed by a past liquidation, retained as an audit record.
    Sold,
}

impl std::fmt::Display for LotCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LotCategory::Core => write!(f, "CORE"),
            LotCategory::Trade => write!(f, "TRADE"),
            LotCategory::Sold => write!(f, "SOLD"),
        }
    }
}

/// A discrete purchase record used for cost-basis tracking.
///
/// The purchase price never changes after creation; a partial sell only
/// reduces `amount`, and a full sell re-categorizes the lot as `Sold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub amount: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub category: LotCategory,
    pub note: String,
}

impl Lot {
    pub fn new(amount: f64, price: f64, category: LotCategory, note: impl Into<String>) -> Self {
        Lot {
            amount,
            price,
            timestamp: Utc::now(),
            category,
            note: note.into(),
        }
    }

    /// Amount times purchase price.
    pub fn cost_basis(&self) -> f64 {
        self.amount * self.price
    }

    /// Whether this lot still counts toward current holdings.
    pub fn is_active(&self) -> bool {
        self.category != LotCategory::Sold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_basis() {
        let lot = Lot::new(0.5, 40000.0, LotCategory::Trade, "dca");
        assert_eq!(lot.cost_basis(), 20000.0);
    }

    #[test]
    fn test_category_wire_format() {
        let json = serde_json::to_string(&LotCategory::Core).unwrap();
        assert_eq!(json, "\"CORE\"");
        let parsed: LotCategory = serde_json::from_str("\"SOLD\"").unwrap();
        assert_eq!(parsed, LotCategory::Sold);
    }

    #[test]
    fn test_sold_lot_is_inactive() {
        let mut lot = Lot::new(1.0, 100.0, LotCategory::Trade, "");
        assert!(lot.is_active());
        lot.category = LotCategory::Sold;
        assert!(!lot.is_active());
    }
}
