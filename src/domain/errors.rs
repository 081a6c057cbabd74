use thiserror::Error;

use crate::domain::entities::trade::TradeSide;
use crate::domain::repositories::broker::BrokerOrderResult;
use crate::domain::services::fail_safe::DependencyUnavailable;

/// Failure reported by an external repository or data source
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Rejections produced by the pre-trade safety gate
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SafetyError {
    #[error(transparent)]
    DependencyUnavailable(#[from] DependencyUnavailable),

    #[error("security not found: {symbol}")]
    SecurityNotFound { symbol: String },

    #[error("SELL quantity {requested:.4} exceeds position {held:.4} for {symbol}")]
    ExceedsPosition {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("pending order already exists for {symbol}")]
    OpenOrderConflict { symbol: String },

    #[error("market is closed for {symbol}")]
    MarketClosed { symbol: String },

    #[error("{check} lookup failed for {symbol}: {source}")]
    LookupFailed {
        check: &'static str,
        symbol: String,
        source: RepositoryError,
    },
}

/// Rejections produced by the order book liquidity and pricing checks
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderBookError {
    #[error(transparent)]
    DependencyUnavailable(#[from] DependencyUnavailable),

    #[error(
        "insufficient liquidity for {side} {symbol}: need {required:.2} ({multiple:.1}x of {quantity:.2}), but only {available:.2} available in top {levels} levels"
    )]
    InsufficientLiquidity {
        symbol: String,
        side: TradeSide,
        quantity: f64,
        multiple: f64,
        required: f64,
        available: f64,
        levels: usize,
    },

    #[error("insufficient liquidity for {side} {symbol}: no {book_side} orders in order book")]
    EmptyBookSide {
        symbol: String,
        side: TradeSide,
        book_side: &'static str,
    },

    #[error("order book for {symbol} has no {book_side} quote")]
    MissingQuote {
        symbol: String,
        book_side: &'static str,
    },

    #[error("failed to fetch order book for {symbol}: {reason}")]
    OrderBookUnavailable { symbol: String, reason: String },

    #[error("reference price unavailable for {symbol}: {reason}")]
    ReferencePriceUnavailable { symbol: String, reason: String },

    #[error("reference price for {symbol} is invalid: {price:.4}")]
    InvalidReferencePrice { symbol: String, price: f64 },

    #[error("computed limit price for {symbol} is invalid: {price:.4}")]
    InvalidLimitPrice { symbol: String, price: f64 },

    #[error(
        "BUY blocked for {symbol}: overpaying, order book ask {best_ask:.4} is {discrepancy_pct:.1}% above reference {reference:.4} (threshold {threshold_pct:.1}%)"
    )]
    Overpaying {
        symbol: String,
        best_ask: f64,
        reference: f64,
        discrepancy_pct: f64,
        threshold_pct: f64,
    },

    #[error(
        "SELL blocked for {symbol}: underselling, order book bid {best_bid:.4} is {discrepancy_pct:.1}% below reference {reference:.4} (threshold {threshold_pct:.1}%)"
    )]
    Underselling {
        symbol: String,
        best_bid: f64,
        reference: f64,
        discrepancy_pct: f64,
        threshold_pct: f64,
    },
}

/// Currency routing and conversion errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CurrencyError {
    #[error("unsupported currency: {0}")]
    UnknownCurrency(String),

    #[error("no conversion path from {from} to {to}")]
    NoConversionPath { from: String, to: String },

    #[error("rate unavailable for {symbol}: {reason}")]
    RateUnavailable { symbol: String, reason: String },

    #[error("invalid rate {rate} for {symbol}")]
    InvalidRate { symbol: String, rate: f64 },

    #[error("invalid conversion amount: {0}")]
    InvalidAmount(f64),

    #[error(transparent)]
    DependencyUnavailable(#[from] DependencyUnavailable),

    #[error("conversion step {symbol} failed: {reason}")]
    StepFailed { symbol: String, reason: String },

    /// A later leg failed after earlier legs were filled. The filled legs
    /// leave the account holding an intermediate currency.
    #[error("conversion stopped at {symbol} after {} completed leg(s): {reason}", .completed.len())]
    PartialConversion {
        completed: Vec<BrokerOrderResult>,
        symbol: String,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid trade side: {0}")]
    InvalidSide(String),

    #[error("Invalid retry status: {0}")]
    InvalidStatus(String),

    #[error("Value must be non-negative")]
    MustBeNonNegative,

    #[error("Value must be positive")]
    MustBePositive,

    #[error("Value must be finite")]
    MustBeFinite,
}
