use crate::domain::errors::ValidationError;

/// Strictly positive, finite order quantity
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value <= 0.0 {
            return Err(ValidationError::MustBePositive);
        }
        Ok(Quantity(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}
