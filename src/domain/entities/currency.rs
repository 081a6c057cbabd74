use serde::{Deserialize, Serialize};

use crate::domain::entities::trade::TradeSide;

/// A quoted currency pair: one unit of `base` costs `rate` units of `quote`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
    pub symbol: String,
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
            symbol: format!("{}{}_T0.ITS", base, quote),
        }
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.base == a && self.quote == b) || (self.base == b && self.quote == a)
    }
}

/// One leg of a conversion path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStep {
    pub symbol: String,
    pub action: TradeSide,
    pub from_currency: String,
    pub to_currency: String,
}
