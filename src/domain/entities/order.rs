use crate::domain::value_objects::{price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that closes a position opened on this side.
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderType {
    Market,
    /// Triggered market order resting at the stop price.
    StopMarket { stop_price: f64 },
}

/// An order request handed to an exchange client.
#[derive(Debug, Clone)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    /// Close-only flag for protective stops; the order may only reduce an
    /// existing position, never open or flip one.
    pub reduce_only: bool,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Result<Self, String> {
        Ok(Order {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity: Quantity::positive(quantity)?,
            reduce_only: false,
        })
    }

    /// A reduce-only protective stop on the opposite side of an entry.
    pub fn protective_stop(
        symbol: impl Into<String>,
        entry_side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<Self, String> {
        Ok(Order {
            symbol: symbol.into(),
            side: entry_side.opposite(),
            order_type: OrderType::StopMarket {
                stop_price: Price::positive(stop_price)?.value(),
            },
            quantity: Quantity::positive(quantity)?,
            reduce_only: true,
        })
    }
}
