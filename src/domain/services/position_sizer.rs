//! PositionSizer service - converts account equity and stop distance into
//! an order size

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::price::Price;

/// Risk-based sizing: the amount lost when the stop is hit equals
/// `equity × risk_fraction`, so the order size is that risk amount divided
/// by the distance between entry and stop.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    /// Smallest order the venue accepts; sized orders below this fail.
    min_order_size: f64,
}

impl PositionSizer {
    pub fn new(min_order_size: f64) -> Self {
        PositionSizer { min_order_size }
    }

    pub fn size(
        &self,
        equity: f64,
        risk_fraction: f64,
        entry_price: f64,
        stop_loss: f64,
    ) -> Result<f64, ValidationError> {
        if !equity.is_finite() || equity <= 0.0 {
            return Err(ValidationError::InvalidSizing(format!(
                "equity must be positive, got {}",
                equity
            )));
        }
        if !risk_fraction.is_finite() || risk_fraction <= 0.0 || risk_fraction > 1.0 {
            return Err(ValidationError::InvalidSizing(format!(
                "risk fraction must be within (0, 1], got {}",
                risk_fraction
            )));
        }

        let entry = Price::positive(entry_price).map_err(ValidationError::InvalidPrice)?;
        let stop = Price::positive(stop_loss).map_err(ValidationError::InvalidPrice)?;

        let stop_distance = entry.distance_to(stop);
        if stop_distance == 0.0 {
            return Err(ValidationError::InvalidSizing(
                "stop distance must be non-zero".to_string(),
            ));
        }

        let size = equity * risk_fraction / stop_distance;
        if size < self.min_order_size {
            return Err(ValidationError::InvalidSizing(format!(
                "sized order {} is below venue minimum {}",
                size, self.min_order_size
            )));
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_from_risk_and_stop_distance() {
        let sizer = PositionSizer::new(0.0001);
        // Risk 2% of 1000 = 20; stop distance 2000 → size 0.01.
        let size = sizer.size(1000.0, 0.02, 50000.0, 48000.0).unwrap();
        assert!((size - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_size_is_symmetric_for_shorts() {
        let sizer = PositionSizer::new(0.0001);
        let long = sizer.size(1000.0, 0.02, 50000.0, 48000.0).unwrap();
        let short = sizer.size(1000.0, 0.02, 48000.0, 50000.0).unwrap();
        assert_eq!(long, short);
    }

    #[test]
    fn test_rejects_non_positive_equity() {
        let sizer = PositionSizer::new(0.0001);
        assert!(sizer.size(0.0, 0.02, 50000.0, 48000.0).is_err());
        assert!(sizer.size(-100.0, 0.02, 50000.0, 48000.0).is_err());
    }

    #[test]
    fn test_rejects_zero_stop_distance() {
        let sizer = PositionSizer::new(0.0001);
        assert!(sizer.size(1000.0, 0.02, 50000.0, 50000.0).is_err());
    }

    #[test]
    fn test_rejects_below_venue_minimum() {
        let sizer = PositionSizer::new(1.0);
        let result = sizer.size(1000.0, 0.02, 50000.0, 48000.0);
        assert!(matches!(result, Err(ValidationError::InvalidSizing(_))));
    }

    #[test]
    fn test_rejects_risk_fraction_out_of_range() {
        let sizer = PositionSizer::new(0.0001);
        assert!(sizer.size(1000.0, 0.0, 50000.0, 48000.0).is_err());
        assert!(sizer.size(1000.0, 1.5, 50000.0, 48000.0).is_err());
    }
}
