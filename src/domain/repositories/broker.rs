//! Broker capabilities
//!
//! The broker wire protocol stays behind these traits. The execution and
//! order book services only ever see an order book snapshot and a placement
//! result.

use async_trait::async_trait;

use crate::domain::entities::order_book::BrokerOrderBook;
use crate::domain::entities::trade::TradeSide;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur during broker operations
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// Order placement was refused; the message is the broker's own text
    OrderRejected(String),
    /// Network error
    NetworkError(String),
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::OrderRejected(msg) => write!(f, "Order rejected: {}", msg),
            BrokerError::NetworkError(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {}

/// Acknowledgement for a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerOrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    /// Zero for market orders
    pub price: f64,
}

#[async_trait]
pub trait OrderBookSource: Send + Sync {
    async fn get_order_book(&self, symbol: &str) -> BrokerResult<BrokerOrderBook>;
}

#[async_trait]
pub trait OrderPlacement: Send + Sync {
    /// Place an order. `limit_price == 0.0` means a market order.
    async fn place_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
        limit_price: f64,
    ) -> BrokerResult<BrokerOrderResult>;
}
