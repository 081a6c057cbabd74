//! Reference price adapter
//!
//! Broker symbols carry an exchange suffix (`AAPL.US`) that the independent
//! price feed does not understand. This adapter strips it, asks the feed with
//! a bounded retry count and refuses anything that is not a positive price.

use std::sync::Arc;

use crate::domain::errors::OrderBookError;
use crate::domain::repositories::market_data::ReferencePriceSource;

/// Attempts the feed may make before giving up
pub const REFERENCE_PRICE_RETRIES: u32 = 3;

/// `AAPL.US` -> `AAPL`. Everything from the first dot on is dropped.
pub fn strip_exchange_suffix(symbol: &str) -> &str {
    match symbol.split_once('.') {
        Some((ticker, _)) => ticker,
        None => symbol,
    }
}

pub struct ReferencePriceValidator {
    source: Arc<dyn ReferencePriceSource>,
}

impl ReferencePriceValidator {
    pub fn new(source: Arc<dyn ReferencePriceSource>) -> Self {
        Self { source }
    }

    pub async fn validation_price(&self, symbol: &str) -> Result<f64, OrderBookError> {
        let ticker = strip_exchange_suffix(symbol);
        tracing::debug!("Fetching reference price for {} as {}", symbol, ticker);

        let price = self
            .source
            .get_price(ticker, REFERENCE_PRICE_RETRIES)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch reference price for {}: {}", symbol, e);
                OrderBookError::ReferencePriceUnavailable {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                }
            })?;

        match price {
            None => Err(OrderBookError::ReferencePriceUnavailable {
                symbol: symbol.to_string(),
                reason: "no price returned".to_string(),
            }),
            Some(price) if !price.is_finite() || price <= 0.0 => {
                tracing::warn!("Reference price for {} is invalid: {}", symbol, price);
                Err(OrderBookError::InvalidReferencePrice {
                    symbol: symbol.to_string(),
                    price,
                })
            }
            Some(price) => Ok(price),
        }
    }
}
