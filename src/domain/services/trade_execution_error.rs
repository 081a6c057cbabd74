//! Trade execution errors with detailed context

use std::fmt;
use thiserror::Error;

use crate::domain::entities::trade::TradeStatus;
use crate::domain::errors::{OrderBookError, SafetyError};
use crate::domain::services::fail_safe::DependencyUnavailable;

/// Why an order in an `execute` batch did not go through
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradeExecutionError {
    /// A hard dependency was not wired
    #[error(transparent)]
    DependencyUnavailable(#[from] DependencyUnavailable),

    /// Cash balance could not be read
    #[error("Failed to fetch {currency} balance: {reason}, blocking BUY for safety")]
    BalanceFetchFailed { currency: String, reason: String },

    /// Account is already overdrawn in the order currency
    #[error("Negative balance: {currency} balance is {balance:.2}")]
    NegativeBalance { currency: String, balance: f64 },

    /// Not enough cash to pay for the order and its commission
    #[error(
        "Insufficient funds: need {required:.2} {currency} ({commission:.2} commission), available {available:.2}"
    )]
    InsufficientFunds {
        currency: String,
        required: f64,
        commission: f64,
        available: f64,
    },

    /// Rejected by the pre-trade safety gate
    #[error(transparent)]
    Safety(#[from] SafetyError),

    /// Rejected by the order book liquidity or pricing checks
    #[error(transparent)]
    OrderBook(#[from] OrderBookError),

    /// Fallback pricing produced an unusable limit
    #[error("Invalid limit price {price:.4} for {symbol}")]
    InvalidLimitPrice { symbol: String, price: f64 },

    /// Broker refused the order because the market is not trading
    #[error("Order placement failed: {reason}")]
    MarketHoursRejection { reason: String },

    /// Broker refused the order for any other reason
    #[error("Order placement failed: {reason}")]
    OrderPlacementFailed { reason: String },

    /// The retry row could not be written
    #[error("Failed to store pending retry: {reason}")]
    RetryStoreFailed { reason: String },
}

impl TradeExecutionError {
    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TradeExecutionError::MarketHoursRejection { .. } => ErrorSeverity::Minor,
            TradeExecutionError::InsufficientFunds { .. } => ErrorSeverity::Moderate,
            TradeExecutionError::Safety(_) => ErrorSeverity::Moderate,
            TradeExecutionError::OrderBook(_) => ErrorSeverity::Moderate,
            TradeExecutionError::BalanceFetchFailed { .. } => ErrorSeverity::Moderate,
            TradeExecutionError::InvalidLimitPrice { .. } => ErrorSeverity::Moderate,
            TradeExecutionError::NegativeBalance { .. } => ErrorSeverity::Critical,
            TradeExecutionError::OrderPlacementFailed { .. } => ErrorSeverity::Critical,
            TradeExecutionError::DependencyUnavailable(_) => ErrorSeverity::Critical,
            TradeExecutionError::RetryStoreFailed { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether the order should be queued for another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradeExecutionError::MarketHoursRejection { .. })
    }

    /// Blocked orders never reached the broker; failed ones did
    pub fn status(&self) -> TradeStatus {
        match self {
            TradeExecutionError::MarketHoursRejection { .. }
            | TradeExecutionError::OrderPlacementFailed { .. }
            | TradeExecutionError::RetryStoreFailed { .. } => TradeStatus::Failed,
            _ => TradeStatus::Blocked,
        }
    }

    /// Get a short error code for logging/monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            TradeExecutionError::DependencyUnavailable(_) => "ERR_DEPENDENCY_UNAVAILABLE",
            TradeExecutionError::BalanceFetchFailed { .. } => "ERR_BALANCE_FETCH",
            TradeExecutionError::NegativeBalance { .. } => "ERR_NEGATIVE_BALANCE",
            TradeExecutionError::InsufficientFunds { .. } => "ERR_INSUFFICIENT_FUNDS",
            TradeExecutionError::Safety(_) => "ERR_SAFETY_CHECK",
            TradeExecutionError::OrderBook(_) => "ERR_ORDER_BOOK",
            TradeExecutionError::InvalidLimitPrice { .. } => "ERR_INVALID_LIMIT",
            TradeExecutionError::MarketHoursRejection { .. } => "ERR_MARKET_HOURS",
            TradeExecutionError::OrderPlacementFailed { .. } => "ERR_ORDER_PLACEMENT",
            TradeExecutionError::RetryStoreFailed { .. } => "ERR_RETRY_STORE",
        }
    }
}

/// Severity levels for trade execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Non-critical, expected to occur occasionally
    Minor,
    /// Moderate issues that indicate problems
    Moderate,
    /// Critical issues that require immediate attention
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Minor => write!(f, "Minor"),
            ErrorSeverity::Moderate => write!(f, "Moderate"),
            ErrorSeverity::Critical => write!(f, "Critical"),
        }
    }
}
