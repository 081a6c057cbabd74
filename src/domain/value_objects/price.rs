use crate::domain::errors::ValidationError;

/// Non-negative, finite price. Zero is the market-order sentinel.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value < 0.0 {
            return Err(ValidationError::MustBeNonNegative);
        }
        Ok(Price(value))
    }

    pub fn market() -> Self {
        Price(0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_market(&self) -> bool {
        self.0 == 0.0
    }

    /// Shift the price by `fraction` in the direction that favours a fill
    pub fn with_buffer(&self, fraction: f64, is_buy: bool) -> Result<Price, ValidationError> {
        if !fraction.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if is_buy {
            Price::new(self.0 * (1.0 + fraction))
        } else {
            Price::new(self.0 * (1.0 - fraction))
        }
    }
}
