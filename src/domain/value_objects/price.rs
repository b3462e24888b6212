#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Price must be finite".to_string());
        }
        if value < 0.0 {
            return Err("Price must be non-negative".to_string());
        }
        Ok(Price(value))
    }

    /// A strictly positive price, as required for fills and cost bases.
    pub fn positive(value: f64) -> Result<Self, String> {
        let price = Price::new(value)?;
        if price.0 == 0.0 {
            return Err("Price must be positive".to_string());
        }
        Ok(price)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Absolute distance to another price, used for stop-distance sizing.
    pub fn distance_to(&self, other: Price) -> f64 {
        (self.0 - other.0).abs()
    }

    pub fn multiply(&self, factor: f64) -> Result<Price, String> {
        if !factor.is_finite() {
            return Err("Factor must be finite".to_string());
        }
        Price::new(self.0 * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(20000.0);
        assert!(price.is_ok());
        assert_eq!(price.unwrap().value(), 20000.0);
    }

    #[test]
    fn test_price_new_negative() {
        let price = Price::new(-10.0);
        assert!(price.is_err());
        assert_eq!(price.unwrap_err(), "Price must be non-negative");
    }

    #[test]
    fn test_price_new_nan() {
        assert!(Price::new(f64::NAN).is_err());
        assert!(Price::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_price_positive_rejects_zero() {
        assert!(Price::new(0.0).is_ok());
        assert!(Price::positive(0.0).is_err());
    }

    #[test]
    fn test_price_distance() {
        let entry = Price::new(50000.0).unwrap();
        let stop = Price::new(48500.0).unwrap();
        assert_eq!(entry.distance_to(stop), 1500.0);
        assert_eq!(stop.distance_to(entry), 1500.0);
    }

    #[test]
    fn test_price_multiply() {
        let price = Price::new(10.0).unwrap();
        let result = price.multiply(2.5).unwrap();
        assert_eq!(result.value(), 25.0);
    }

    #[test]
    fn test_price_multiply_nan() {
        let price = Price::new(10.0).unwrap();
        assert!(price.multiply(f64::NAN).is_err());
    }
}
