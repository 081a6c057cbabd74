use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, TradeSide::Buy)
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(ValidationError::InvalidSide(other.to_string())),
        }
    }
}

/// An order the caller wants executed. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Quantity,
    pub currency: String,
    pub estimated_price: Price,
    pub reason: String,
}

impl TradeRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: TradeSide,
        quantity: f64,
        currency: impl Into<String>,
        estimated_price: f64,
        reason: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(ValidationError::InvalidSymbol(
                "symbol cannot be empty".to_string(),
            ));
        }
        let quantity = Quantity::new(quantity)
            .map_err(|e| ValidationError::InvalidQuantity(e.to_string()))?;
        let estimated_price = Price::new(estimated_price)
            .map_err(|e| ValidationError::InvalidPrice(e.to_string()))?;

        Ok(TradeRequest {
            symbol,
            side,
            quantity,
            currency: currency.into(),
            estimated_price,
            reason: reason.into(),
        })
    }

    /// Quantity times estimated price, in the request currency
    pub fn trade_value(&self) -> f64 {
        self.quantity.value() * self.estimated_price.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Success,
    Blocked,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Success => "success",
            TradeStatus::Blocked => "blocked",
            TradeStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one order in an `execute` batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub symbol: String,
    pub side: TradeSide,
    pub status: TradeStatus,
    pub error: Option<String>,
    pub broker_order_id: Option<String>,
    pub limit_price: Option<f64>,
    pub retry_scheduled: bool,
}

impl TradeResult {
    pub fn success(
        request: &TradeRequest,
        broker_order_id: impl Into<String>,
        limit_price: f64,
    ) -> Self {
        TradeResult {
            symbol: request.symbol.clone(),
            side: request.side,
            status: TradeStatus::Success,
            error: None,
            broker_order_id: Some(broker_order_id.into()),
            limit_price: Some(limit_price),
            retry_scheduled: false,
        }
    }

    pub fn blocked(request: &TradeRequest, error: impl Into<String>) -> Self {
        TradeResult {
            symbol: request.symbol.clone(),
            side: request.side,
            status: TradeStatus::Blocked,
            error: Some(error.into()),
            broker_order_id: None,
            limit_price: None,
            retry_scheduled: false,
        }
    }

    pub fn failed(request: &TradeRequest, error: impl Into<String>, retry_scheduled: bool) -> Self {
        TradeResult {
            symbol: request.symbol.clone(),
            side: request.side,
            status: TradeStatus::Failed,
            error: Some(error.into()),
            broker_order_id: None,
            limit_price: None,
            retry_scheduled,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TradeStatus::Success
    }
}

/// Ledger entry for a broker order that was accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub currency: String,
    pub broker_order_id: String,
    pub reason: String,
    pub executed_at: chrono::DateTime<chrono::Utc>,
}

impl ExecutedTrade {
    pub fn from_request(request: &TradeRequest, broker_order_id: &str, price: f64) -> Self {
        ExecutedTrade {
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity.value(),
            price,
            currency: request.currency.clone(),
            broker_order_id: broker_order_id.to_string(),
            reason: request.reason.clone(),
            executed_at: chrono::Utc::now(),
        }
    }
}
