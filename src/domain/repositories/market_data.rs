use async_trait::async_trait;

use crate::domain::errors::RepositoryError;

/// Independent price feed used to sanity-check the broker's order book
#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
    /// `Ok(None)` when the feed has no price for the symbol
    async fn get_price(&self, symbol: &str, max_retries: u32)
        -> Result<Option<f64>, RepositoryError>;
}

/// Rate feed for quoted currency pairs such as `EURUSD_T0.ITS`
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self, pair_symbol: &str) -> Result<f64, RepositoryError>;
}

#[async_trait]
pub trait MarketHoursAdvisory: Send + Sync {
    async fn is_open(&self, symbol: &str) -> Result<bool, RepositoryError>;
}
