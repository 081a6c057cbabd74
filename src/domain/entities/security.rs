use serde::{Deserialize, Serialize};

/// Reference record for a tradable instrument, keyed by symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub symbol: String,
    pub name: String,
    pub currency: String,
    pub exchange: String,
}

/// Read-only holding snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub currency: String,
}

impl Position {
    pub fn covers(&self, quantity: f64) -> bool {
        quantity <= self.quantity
    }
}
