use thiserror::Error;

use crate::domain::repositories::exchange_client::ExchangeError;

/// Validation failures for domain values and operations
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid sizing input: {0}")]
    InvalidSizing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised by the lot accounting engine
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A liquidation asked for more than the trade allocation holds.
    /// The lot set is left untouched when this is returned.
    #[error("Insufficient trade lots: requested {requested}, available {available}")]
    InsufficientLots { requested: f64, available: f64 },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors surfaced by the order execution path
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_lots_display() {
        let err = LedgerError::InsufficientLots {
            requested: 2.0,
            available: 1.2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient trade lots: requested 2, available 1.2"
        );
    }

    #[test]
    fn test_execution_error_from_exchange() {
        let err: ExecutionError = ExchangeError::Timeout.into();
        assert!(matches!(err, ExecutionError::Exchange(_)));
    }
}
