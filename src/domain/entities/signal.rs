use crate::domain::entities::position::PositionSide;
use crate::domain::errors::ValidationError;

/// A strategy-generated trade signal, the contract this core consumes from
/// its signal collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Caller-fixed size; when absent the core sizes from equity and
    /// stop distance.
    pub size: Option<f64>,
    pub strategy: String,
}

impl TradeSignal {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        strategy: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let signal = TradeSignal {
            symbol: symbol.into(),
            side,
            entry_price,
            stop_loss,
            take_profit,
            size: None,
            strategy: strategy.into(),
        };
        signal.validate()?;
        Ok(signal)
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("entry_price", self.entry_price),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::InvalidSignal(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        // Stop and target must sit on the losing and winning side of entry.
        let ordered = match self.side {
            PositionSide::Long => {
                self.stop_loss < self.entry_price && self.take_profit > self.entry_price
            }
            PositionSide::Short => {
                self.stop_loss > self.entry_price && self.take_profit < self.entry_price
            }
        };
        if !ordered {
            return Err(ValidationError::InvalidSignal(format!(
                "{} signal has stop {} / target {} on the wrong side of entry {}",
                self.side, self.stop_loss, self.take_profit, self.entry_price
            )));
        }

        Ok(())
    }
}
