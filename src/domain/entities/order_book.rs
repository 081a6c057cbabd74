use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: f64,
    /// Rank within its side, 1 = best
    pub position: u32,
}

impl OrderBookLevel {
    pub fn new(price: f64, quantity: f64, position: u32) -> Self {
        Self {
            price,
            quantity,
            position,
        }
    }
}

/// Snapshot of a broker order book. Levels may arrive in any order; rank wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrderBook {
    pub symbol: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl BrokerOrderBook {
    pub fn new(symbol: impl Into<String>, bids: Vec<OrderBookLevel>, asks: Vec<OrderBookLevel>) -> Self {
        Self {
            symbol: symbol.into(),
            bids,
            asks,
            timestamp: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.iter().min_by_key(|level| level.position)
    }

    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.iter().min_by_key(|level| level.position)
    }

    /// Total quantity over the best `depth` levels of `levels`
    pub fn depth_quantity(levels: &[OrderBookLevel], depth: usize) -> f64 {
        let mut ranked: Vec<&OrderBookLevel> = levels.iter().collect();
        ranked.sort_by_key(|level| level.position);
        ranked.iter().take(depth).map(|level| level.quantity).sum()
    }
}
