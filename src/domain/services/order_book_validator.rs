//! Order book liquidity and limit pricing
//!
//! Two checks run against the live broker book before an order is sent:
//!
//! - **Liquidity**: the opposing side must hold at least
//!   `quantity * min_liquidity_multiple` across its best
//!   `order_book_depth_levels` levels.
//! - **Pricing**: the book is compared against an independent reference
//!   price. A BUY whose best ask sits too far above the reference, or a SELL
//!   whose best bid sits too far below it, is treated as bad market data and
//!   blocked. Discrepancies in the trader's favour never block.
//!
//! When both pass, the limit is the book midpoint shifted by the buffer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{
    setting_default, ENABLE_ORDER_BOOK_ANALYSIS, MIN_LIQUIDITY_MULTIPLE, ORDER_BOOK_DEPTH_LEVELS,
    PRICE_DISCREPANCY_THRESHOLD,
};
use crate::domain::entities::order_book::{BrokerOrderBook, OrderBookLevel};
use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::OrderBookError;
use crate::domain::repositories::broker::OrderBookSource;
use crate::domain::repositories::settings::{read_setting, SettingsSource};
use crate::domain::services::fail_safe::{Capability, Dependency};
use crate::domain::services::reference_price::ReferencePriceValidator;
use crate::domain::value_objects::price::Price;

#[async_trait]
pub trait OrderBookAnalysis: Send + Sync {
    async fn is_enabled(&self) -> bool;

    async fn validate_liquidity(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<(), OrderBookError>;

    async fn calculate_optimal_limit(
        &self,
        symbol: &str,
        side: TradeSide,
        buffer: f64,
    ) -> Result<f64, OrderBookError>;
}

pub struct OrderBookValidator {
    order_books: Dependency<dyn OrderBookSource>,
    reference_prices: Dependency<ReferencePriceValidator>,
    settings: Dependency<dyn SettingsSource>,
}

impl OrderBookValidator {
    pub fn new(
        order_books: Option<Arc<dyn OrderBookSource>>,
        reference_prices: Option<Arc<ReferencePriceValidator>>,
        settings: Option<Arc<dyn SettingsSource>>,
    ) -> Self {
        Self {
            order_books: Dependency::new(Capability::OrderBookSource, order_books),
            reference_prices: Dependency::new(Capability::ReferencePrice, reference_prices),
            settings: Dependency::new(Capability::Settings, settings),
        }
    }

    async fn setting(&self, key: &str) -> f64 {
        read_setting(self.settings.get().map(|s| s.as_ref()), key, setting_default(key)).await
    }

    async fn fetch_order_book(&self, symbol: &str) -> Result<BrokerOrderBook, OrderBookError> {
        let source = self.order_books.require()?;
        source
            .get_order_book(symbol)
            .await
            .map_err(|e| OrderBookError::OrderBookUnavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })
    }

    fn opposing_side(book: &BrokerOrderBook, side: TradeSide) -> (&[OrderBookLevel], &'static str) {
        match side {
            TradeSide::Buy => (&book.asks, "ask"),
            TradeSide::Sell => (&book.bids, "bid"),
        }
    }
}

#[async_trait]
impl OrderBookAnalysis for OrderBookValidator {
    async fn is_enabled(&self) -> bool {
        self.setting(ENABLE_ORDER_BOOK_ANALYSIS).await != 0.0
    }

    async fn validate_liquidity(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<(), OrderBookError> {
        let book = self.fetch_order_book(symbol).await?;

        let multiple = self.setting(MIN_LIQUIDITY_MULTIPLE).await;
        let depth = self.setting(ORDER_BOOK_DEPTH_LEVELS).await.max(1.0) as usize;
        let required = quantity * multiple;

        let (levels, book_side) = Self::opposing_side(&book, side);
        if levels.is_empty() {
            return Err(OrderBookError::EmptyBookSide {
                symbol: symbol.to_string(),
                side,
                book_side,
            });
        }

        let levels_checked = depth.min(levels.len());
        let available = BrokerOrderBook::depth_quantity(levels, depth);

        if available < required {
            return Err(OrderBookError::InsufficientLiquidity {
                symbol: symbol.to_string(),
                side,
                quantity,
                multiple,
                required,
                available,
                levels: levels_checked,
            });
        }

        tracing::info!(
            "Liquidity check passed for {} {} {}: required {:.2}, available {:.2} in top {} levels",
            side,
            quantity,
            symbol,
            required,
            available,
            levels_checked
        );
        Ok(())
    }

    async fn calculate_optimal_limit(
        &self,
        symbol: &str,
        side: TradeSide,
        buffer: f64,
    ) -> Result<f64, OrderBookError> {
        let reference = self
            .reference_prices
            .require()?
            .validation_price(symbol)
            .await?;

        let book = self.fetch_order_book(symbol).await?;
        let best_bid = book
            .best_bid()
            .map(|level| level.price)
            .ok_or_else(|| OrderBookError::MissingQuote {
                symbol: symbol.to_string(),
                book_side: "bid",
            })?;
        let best_ask = book
            .best_ask()
            .map(|level| level.price)
            .ok_or_else(|| OrderBookError::MissingQuote {
                symbol: symbol.to_string(),
                book_side: "ask",
            })?;

        let threshold = self.setting(PRICE_DISCREPANCY_THRESHOLD).await;

        match side {
            TradeSide::Buy => {
                let discrepancy = (best_ask - reference) / reference;
                if discrepancy > threshold {
                    tracing::error!(
                        "Order book ask {} for {} is {:.1}% above reference {}, blocking BUY",
                        best_ask,
                        symbol,
                        discrepancy * 100.0,
                        reference
                    );
                    return Err(OrderBookError::Overpaying {
                        symbol: symbol.to_string(),
                        best_ask,
                        reference,
                        discrepancy_pct: discrepancy * 100.0,
                        threshold_pct: threshold * 100.0,
                    });
                }
            }
            TradeSide::Sell => {
                let discrepancy = (reference - best_bid) / reference;
                if discrepancy > threshold {
                    tracing::error!(
                        "Order book bid {} for {} is {:.1}% below reference {}, blocking SELL",
                        best_bid,
                        symbol,
                        discrepancy * 100.0,
                        reference
                    );
                    return Err(OrderBookError::Underselling {
                        symbol: symbol.to_string(),
                        best_bid,
                        reference,
                        discrepancy_pct: discrepancy * 100.0,
                        threshold_pct: threshold * 100.0,
                    });
                }
            }
        }

        let midpoint = (best_bid + best_ask) / 2.0;
        let limit = Price::new(midpoint)
            .and_then(|mid| mid.with_buffer(buffer, side.is_buy()))
            .map_err(|_| OrderBookError::InvalidLimitPrice {
                symbol: symbol.to_string(),
                price: if side.is_buy() {
                    midpoint * (1.0 + buffer)
                } else {
                    midpoint * (1.0 - buffer)
                },
            })?;

        tracing::info!(
            "Limit for {} {}: {:.4} (bid {}, ask {}, reference {}, buffer {:.2}%)",
            side,
            symbol,
            limit.value(),
            best_bid,
            best_ask,
            reference,
            buffer * 100.0
        );
        Ok(limit.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingConfig;
    use crate::domain::errors::RepositoryError;
    use crate::domain::repositories::broker::{BrokerError, BrokerResult};
    use crate::domain::repositories::market_data::ReferencePriceSource;

    struct MockBook {
        book: BrokerOrderBook,
    }

    #[async_trait]
    impl OrderBookSource for MockBook {
        async fn get_order_book(&self, _symbol: &str) -> BrokerResult<BrokerOrderBook> {
            Ok(self.book.clone())
        }
    }

    struct FailingBook;

    #[async_trait]
    impl OrderBookSource for FailingBook {
        async fn get_order_book(&self, _symbol: &str) -> BrokerResult<BrokerOrderBook> {
            Err(BrokerError::NetworkError("connection reset".to_string()))
        }
    }

    struct MockFeed(Option<f64>);

    #[async_trait]
    impl ReferencePriceSource for MockFeed {
        async fn get_price(&self, _symbol: &str, _max_retries: u32) -> Result<Option<f64>, RepositoryError> {
            Ok(self.0)
        }
    }

    struct BrokenSettings;

    #[async_trait]
    impl SettingsSource for BrokenSettings {
        async fn get_setting(&self, _key: &str) -> Result<Option<f64>, RepositoryError> {
            Err(RepositoryError::QueryFailed("no such table".to_string()))
        }
    }

    fn book(bid: f64, ask: f64, bid_qty: f64, ask_qty: f64) -> BrokerOrderBook {
        BrokerOrderBook::new(
            "AAPL.US",
            vec![OrderBookLevel::new(bid, bid_qty, 1)],
            vec![OrderBookLevel::new(ask, ask_qty, 1)],
        )
    }

    fn validator(book: BrokerOrderBook, reference: Option<f64>) -> OrderBookValidator {
        OrderBookValidator::new(
            Some(Arc::new(MockBook { book })),
            Some(Arc::new(ReferencePriceValidator::new(Arc::new(MockFeed(reference))))),
            Some(Arc::new(TradingConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_liquidity_sufficient() {
        let v = validator(book(99.0, 100.0, 1000.0, 1000.0), Some(100.0));
        assert!(v.validate_liquidity("AAPL.US", TradeSide::Buy, 100.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_liquidity_exactly_at_requirement_passes() {
        let v = validator(book(99.0, 100.0, 200.0, 200.0), Some(100.0));
        assert!(v.validate_liquidity("AAPL.US", TradeSide::Sell, 100.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_liquidity_insufficient() {
        let v = validator(book(99.0, 100.0, 1000.0, 50.0), Some(100.0));
        let err = v
            .validate_liquidity("AAPL.US", TradeSide::Buy, 100.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient liquidity"));
        assert!(matches!(
            err,
            OrderBookError::InsufficientLiquidity { required, available, levels: 1, .. }
                if required == 200.0 && available == 50.0
        ));
    }

    #[tokio::test]
    async fn test_liquidity_only_counts_configured_depth() {
        let asks: Vec<OrderBookLevel> = (1..=7)
            .map(|rank| OrderBookLevel::new(100.0 + rank as f64, 10.0, rank))
            .collect();
        let book = BrokerOrderBook::new("AAPL.US", vec![OrderBookLevel::new(99.0, 10.0, 1)], asks);
        let v = validator(book, Some(100.0));
        // five levels of 10 = 50, need 2 x 30 = 60
        let err = v
            .validate_liquidity("AAPL.US", TradeSide::Buy, 30.0)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderBookError::InsufficientLiquidity { levels: 5, .. }));
        assert!(v.validate_liquidity("AAPL.US", TradeSide::Buy, 25.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_liquidity_empty_side() {
        let book = BrokerOrderBook::new("AAPL.US", vec![], vec![OrderBookLevel::new(100.0, 10.0, 1)]);
        let v = validator(book, Some(100.0));
        let err = v
            .validate_liquidity("AAPL.US", TradeSide::Sell, 1.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient liquidity"));
        assert!(err.to_string().contains("no bid orders"));
    }

    #[tokio::test]
    async fn test_liquidity_order_book_failure() {
        let v = OrderBookValidator::new(Some(Arc::new(FailingBook)), None, None);
        assert!(matches!(
            v.validate_liquidity("AAPL.US", TradeSide::Buy, 1.0).await,
            Err(OrderBookError::OrderBookUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_buy_with_cheaper_order_book() {
        let v = validator(book(89.0, 90.0, 1000.0, 1000.0), Some(100.0));
        let limit = v
            .calculate_optimal_limit("AAPL.US", TradeSide::Buy, 0.05)
            .await
            .unwrap();
        assert_eq!(limit, (89.0 + 90.0) / 2.0 * 1.05);
        assert!((limit - 93.975).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buy_with_expensive_order_book_is_blocked() {
        let v = validator(book(999.0, 1000.0, 1000.0, 1000.0), Some(100.0));
        let err = v
            .calculate_optimal_limit("AAPL.US", TradeSide::Buy, 0.05)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("overpaying"));
    }

    #[tokio::test]
    async fn test_sell_with_higher_order_book() {
        let v = validator(book(110.0, 111.0, 1000.0, 1000.0), Some(100.0));
        let limit = v
            .calculate_optimal_limit("AAPL.US", TradeSide::Sell, 0.05)
            .await
            .unwrap();
        assert_eq!(limit, (110.0 + 111.0) / 2.0 * 0.95);
        assert!((limit - 104.975).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sell_with_low_order_book_is_blocked() {
        let v = validator(book(10.0, 11.0, 1000.0, 1000.0), Some(100.0));
        let err = v
            .calculate_optimal_limit("AAPL.US", TradeSide::Sell, 0.05)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("underselling"));
    }

    #[tokio::test]
    async fn test_buy_far_below_reference_is_not_blocked() {
        let v = validator(book(9.0, 10.0, 1000.0, 1000.0), Some(100.0));
        assert!(v.calculate_optimal_limit("AAPL.US", TradeSide::Buy, 0.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_reference_price_aborts() {
        let v = validator(book(89.0, 90.0, 1000.0, 1000.0), None);
        assert!(matches!(
            v.calculate_optimal_limit("AAPL.US", TradeSide::Buy, 0.05).await,
            Err(OrderBookError::ReferencePriceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_reference_source_blocks() {
        let v = OrderBookValidator::new(
            Some(Arc::new(MockBook { book: book(89.0, 90.0, 1.0, 1.0) })),
            None,
            None,
        );
        let err = v
            .calculate_optimal_limit("AAPL.US", TradeSide::Buy, 0.05)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "reference price source not available");
    }

    #[tokio::test]
    async fn test_is_enabled() {
        let mut config = TradingConfig::default();
        let enabled = OrderBookValidator::new(None, None, Some(Arc::new(config.clone())));
        assert!(enabled.is_enabled().await);

        config.enable_order_book_analysis = false;
        let disabled = OrderBookValidator::new(None, None, Some(Arc::new(config)));
        assert!(!disabled.is_enabled().await);

        let missing = OrderBookValidator::new(None, None, None);
        assert!(missing.is_enabled().await);

        let broken = OrderBookValidator::new(None, None, Some(Arc::new(BrokenSettings)));
        assert!(broken.is_enabled().await);
    }
}
