//! TradeExecutionService - takes approved trade requests to the broker
//!
//! Per order, in this order:
//!
//! 1. BUY only: cash must cover trade value plus commission
//! 2. safety gate
//! 3. order book liquidity and limit price, or the estimated price plus
//!    buffer when order book analysis is off
//! 4. place the limit order
//! 5. classify a broker refusal: market hours refusals are queued for retry,
//!    anything else fails for good
//!
//! A request that does not pass steps 1-3 never reaches the broker.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{
    setting_default, TradingConfig, LIMIT_ORDER_BUFFER_PERCENT, TRANSACTION_COST_FIXED,
    TRANSACTION_COST_PERCENT,
};
use crate::domain::entities::pending_retry::{NewPendingRetry, DEFAULT_MAX_ATTEMPTS};
use crate::domain::entities::trade::{ExecutedTrade, TradeRequest, TradeResult, TradeSide};
use crate::domain::repositories::broker::OrderPlacement;
use crate::domain::repositories::portfolio::CashBalance;
use crate::domain::repositories::retry_store::{RetryStore, TradeRecorder};
use crate::domain::repositories::settings::{read_setting, SettingsSource};
use crate::domain::services::currency_exchange::{ExchangeRateProvider, HUB_CURRENCY};
use crate::domain::services::fail_safe::{Capability, Dependency};
use crate::domain::services::order_book_validator::OrderBookAnalysis;
use crate::domain::services::trade_execution_error::{ErrorSeverity, TradeExecutionError};
use crate::domain::services::trade_safety::TradeGate;
use crate::domain::value_objects::price::Price;

/// Broker messages that mean "try again when the market is open"
pub const MARKET_HOURS_PHRASES: &[&str] = &[
    "market is closed",
    "market closed",
    "trading hours",
    "outside trading hours",
    "market not open",
    "exchange closed",
    "trading session closed",
    "after hours",
    "pre-market",
];

pub fn is_market_hours_error(message: &str) -> bool {
    let message = message.to_lowercase();
    MARKET_HOURS_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

/// Map a broker refusal onto the execution error it stands for
pub fn classify_rejection(reason: String) -> TradeExecutionError {
    if is_market_hours_error(&reason) {
        TradeExecutionError::MarketHoursRejection { reason }
    } else {
        TradeExecutionError::OrderPlacementFailed { reason }
    }
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Execute a batch. Results line up 1:1 with `requests`.
    async fn execute(&self, requests: &[TradeRequest]) -> Vec<TradeResult>;

    /// Execute one request on behalf of the retry sweep. A market hours
    /// refusal is reported but not queued again; the sweep owns the row.
    async fn execute_retry(&self, request: &TradeRequest) -> TradeResult;
}

/// Collaborators for execution. Any of them may be left out; the fail-safe
/// table decides what that means.
#[derive(Default, Clone)]
pub struct ExecutionDependencies {
    pub broker: Option<Arc<dyn OrderPlacement>>,
    pub safety: Option<Arc<dyn TradeGate>>,
    pub order_book: Option<Arc<dyn OrderBookAnalysis>>,
    pub cash: Option<Arc<dyn CashBalance>>,
    pub exchange_rates: Option<Arc<dyn ExchangeRateProvider>>,
    pub retry_store: Option<Arc<dyn RetryStore>>,
    pub recorder: Option<Arc<dyn TradeRecorder>>,
    pub settings: Option<Arc<dyn SettingsSource>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: i64,
    pub interval: chrono::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: chrono::Duration::hours(7),
        }
    }
}

impl From<&TradingConfig> for RetryPolicy {
    fn from(config: &TradingConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_retry_attempts,
            interval: config.retry_interval_chrono(),
        }
    }
}

pub struct TradeExecutionService {
    broker: Dependency<dyn OrderPlacement>,
    safety: Dependency<dyn TradeGate>,
    order_book: Dependency<dyn OrderBookAnalysis>,
    cash: Dependency<dyn CashBalance>,
    exchange_rates: Dependency<dyn ExchangeRateProvider>,
    retry_store: Dependency<dyn RetryStore>,
    recorder: Dependency<dyn TradeRecorder>,
    settings: Dependency<dyn SettingsSource>,
    retry_policy: RetryPolicy,
    hub_currency: String,
}

impl TradeExecutionService {
    pub fn new(deps: ExecutionDependencies) -> Self {
        Self {
            broker: Dependency::new(Capability::OrderPlacement, deps.broker),
            safety: Dependency::new(Capability::SafetyGate, deps.safety),
            order_book: Dependency::new(Capability::OrderBookValidator, deps.order_book),
            cash: Dependency::new(Capability::CashBalance, deps.cash),
            exchange_rates: Dependency::new(Capability::CurrencyConverter, deps.exchange_rates),
            retry_store: Dependency::new(Capability::RetryStore, deps.retry_store),
            recorder: Dependency::new(Capability::TradeRecorder, deps.recorder),
            settings: Dependency::new(Capability::Settings, deps.settings),
            retry_policy: RetryPolicy::default(),
            hub_currency: HUB_CURRENCY.to_string(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_hub_currency(mut self, currency: impl Into<String>) -> Self {
        self.hub_currency = currency.into();
        self
    }

    async fn setting(&self, key: &str) -> f64 {
        read_setting(self.settings.get().map(|s| s.as_ref()), key, setting_default(key)).await
    }

    /// Fixed fee (quoted in the hub currency, converted into `currency`)
    /// plus a percentage of the trade value. When the fee cannot be
    /// converted it is charged unconverted.
    pub async fn calculate_commission(&self, trade_value: f64, currency: &str) -> f64 {
        let fixed = self.setting(TRANSACTION_COST_FIXED).await;
        let variable_rate = self.setting(TRANSACTION_COST_PERCENT).await;

        let fixed_in_currency = if currency == self.hub_currency {
            fixed
        } else {
            match self.exchange_rates.resolve() {
                Ok(Some(rates)) => match rates.get_rate(&self.hub_currency, currency).await {
                    Ok(rate) => fixed * rate,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to convert fixed commission {} -> {}: {}, using unconverted fee",
                            self.hub_currency,
                            currency,
                            e
                        );
                        fixed
                    }
                },
                _ => fixed,
            }
        };

        fixed_in_currency + trade_value * variable_rate
    }

    /// BUY orders need cash for the trade value plus commission. SELL
    /// orders pass straight through.
    pub async fn validate_buy_cash_balance(
        &self,
        request: &TradeRequest,
    ) -> Result<(), TradeExecutionError> {
        if request.side != TradeSide::Buy {
            return Ok(());
        }

        let cash = self.cash.require()?;
        let balance = cash
            .get_balance(&request.currency)
            .await
            .map_err(|e| TradeExecutionError::BalanceFetchFailed {
                currency: request.currency.clone(),
                reason: e.to_string(),
            })?;

        if balance < 0.0 {
            tracing::error!(
                "Negative {} balance {:.2}, blocking BUY of {}",
                request.currency,
                balance,
                request.symbol
            );
            return Err(TradeExecutionError::NegativeBalance {
                currency: request.currency.clone(),
                balance,
            });
        }

        let trade_value = request.trade_value();
        let commission = self.calculate_commission(trade_value, &request.currency).await;
        let required = trade_value + commission;

        if balance < required {
            return Err(TradeExecutionError::InsufficientFunds {
                currency: request.currency.clone(),
                required,
                commission,
                available: balance,
            });
        }

        tracing::debug!(
            "Cash check passed for {}: need {:.2} {}, have {:.2}",
            request.symbol,
            required,
            request.currency,
            balance
        );
        Ok(())
    }

    /// Queue a failed order for a later attempt
    pub async fn store_pending_retry(
        &self,
        request: &TradeRequest,
        failure_reason: &str,
    ) -> Result<i64, TradeExecutionError> {
        let store = self.retry_store.require()?;

        let retry = NewPendingRetry {
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity.value(),
            estimated_price: request.estimated_price.value(),
            currency: request.currency.clone(),
            reason: request.reason.clone(),
            failure_reason: failure_reason.to_string(),
            max_attempts: self.retry_policy.max_attempts,
            next_retry_at: Utc::now() + self.retry_policy.interval,
        };

        let id = store
            .create_pending_retry(&retry)
            .await
            .map_err(|e| TradeExecutionError::RetryStoreFailed {
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Queued retry {} for {} {} {} at {}",
            id,
            request.side,
            request.quantity.value(),
            request.symbol,
            retry.next_retry_at
        );
        Ok(id)
    }

    async fn resolve_limit_price(&self, request: &TradeRequest) -> Result<f64, TradeExecutionError> {
        let buffer = self.setting(LIMIT_ORDER_BUFFER_PERCENT).await;
        let quantity = request.quantity.value();

        if let Some(order_book) = self.order_book.resolve()? {
            if order_book.is_enabled().await {
                order_book
                    .validate_liquidity(&request.symbol, request.side, quantity)
                    .await?;
                let limit = order_book
                    .calculate_optimal_limit(&request.symbol, request.side, buffer)
                    .await?;
                return Ok(limit);
            }
            tracing::debug!("Order book analysis disabled, pricing {} from estimate", request.symbol);
        }

        let fallback = request
            .estimated_price
            .with_buffer(buffer, request.side.is_buy())
            .ok()
            .filter(|price| !price.is_market());

        match fallback {
            Some(price) => Ok(price.value()),
            None => Err(TradeExecutionError::InvalidLimitPrice {
                symbol: request.symbol.clone(),
                price: estimated_with_buffer(request.estimated_price, buffer, request.side),
            }),
        }
    }

    async fn place(
        &self,
        request: &TradeRequest,
        schedule_retries: bool,
    ) -> Result<TradeResult, TradeExecutionError> {
        self.validate_buy_cash_balance(request).await?;

        let safety = self.safety.require()?;
        safety
            .validate_trade(&request.symbol, request.side, request.quantity.value())
            .await?;

        let limit_price = self.resolve_limit_price(request).await?;
        let broker = self.broker.require()?;

        tracing::info!(
            "Placing {} {} {} @ {:.4} {}",
            request.side,
            request.quantity.value(),
            request.symbol,
            limit_price,
            request.currency
        );

        match broker
            .place_order(&request.symbol, request.side, request.quantity.value(), limit_price)
            .await
        {
            Ok(order) => {
                self.record(request, &order.order_id, limit_price).await;
                Ok(TradeResult::success(request, order.order_id, limit_price))
            }
            Err(e) => {
                let reason = e.to_string();
                let error = classify_rejection(reason.clone());
                if !error.is_retryable() {
                    return Err(error);
                }

                let retry_scheduled = schedule_retries
                    && match self.store_pending_retry(request, &reason).await {
                        Ok(_) => true,
                        Err(store_error) => {
                            tracing::error!(
                                "Could not queue retry for {}: {}",
                                request.symbol,
                                store_error
                            );
                            false
                        }
                    };
                Ok(TradeResult::failed(request, error.to_string(), retry_scheduled))
            }
        }
    }

    async fn record(&self, request: &TradeRequest, order_id: &str, price: f64) {
        let Ok(Some(recorder)) = self.recorder.resolve() else {
            return;
        };
        let trade = ExecutedTrade::from_request(request, order_id, price);
        if let Err(e) = recorder.record_trade(&trade).await {
            tracing::error!("Failed to record trade {} for {}: {}", order_id, request.symbol, e);
        }
    }

    async fn execute_one(&self, request: &TradeRequest, schedule_retries: bool) -> TradeResult {
        match self.place(request, schedule_retries).await {
            Ok(result) => {
                if result.is_success() {
                    tracing::info!(
                        "Order {} placed for {} {}",
                        result.broker_order_id.as_deref().unwrap_or_default(),
                        request.side,
                        request.symbol
                    );
                } else {
                    tracing::warn!(
                        "{} {} not placed: {} (retry queued: {})",
                        request.side,
                        request.symbol,
                        result.error.as_deref().unwrap_or_default(),
                        result.retry_scheduled
                    );
                }
                result
            }
            Err(e) => {
                if e.severity() == ErrorSeverity::Critical {
                    tracing::error!(
                        "[{}][{}] {} {} {}: {}",
                        e.severity(),
                        e.error_code(),
                        request.side,
                        request.symbol,
                        e.status(),
                        e
                    );
                } else {
                    tracing::warn!(
                        "[{}][{}] {} {} {}: {}",
                        e.severity(),
                        e.error_code(),
                        request.side,
                        request.symbol,
                        e.status(),
                        e
                    );
                }
                TradeResult {
                    status: e.status(),
                    ..TradeResult::blocked(request, e.to_string())
                }
            }
        }
    }
}

fn estimated_with_buffer(estimated: Price, buffer: f64, side: TradeSide) -> f64 {
    match side {
        TradeSide::Buy => estimated.value() * (1.0 + buffer),
        TradeSide::Sell => estimated.value() * (1.0 - buffer),
    }
}

#[async_trait]
impl TradeExecutor for TradeExecutionService {
    async fn execute(&self, requests: &[TradeRequest]) -> Vec<TradeResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.execute_one(request, true).await);
        }
        results
    }

    async fn execute_retry(&self, request: &TradeRequest) -> TradeResult {
        self.execute_one(request, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::pending_retry::{PendingRetry, RetryStatus};
    use crate::domain::entities::trade::TradeStatus;
    use crate::domain::errors::{CurrencyError, OrderBookError, RepositoryError, SafetyError};
    use crate::domain::repositories::broker::{BrokerError, BrokerOrderResult, BrokerResult};
    use chrono::DateTime;
    use std::sync::Mutex;

    struct MockCash(Result<f64, RepositoryError>);

    #[async_trait]
    impl CashBalance for MockCash {
        async fn get_balance(&self, _currency: &str) -> Result<f64, RepositoryError> {
            self.0.clone()
        }
    }

    struct MockRates(Result<f64, CurrencyError>);

    #[async_trait]
    impl ExchangeRateProvider for MockRates {
        async fn get_rate(&self, _from: &str, _to: &str) -> Result<f64, CurrencyError> {
            self.0.clone()
        }
    }

    struct MockGate(Result<(), SafetyError>);

    #[async_trait]
    impl TradeGate for MockGate {
        async fn validate_trade(&self, _s: &str, _side: TradeSide, _q: f64) -> Result<(), SafetyError> {
            self.0.clone()
        }
    }

    struct MockBroker {
        answer: BrokerResult<String>,
        placed: Mutex<Vec<(String, f64)>>,
    }

    impl MockBroker {
        fn accepting() -> Arc<Self> {
            Self::answering(Ok("order-1".to_string()))
        }

        fn answering(answer: BrokerResult<String>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                placed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OrderPlacement for MockBroker {
        async fn place_order(
            &self,
            symbol: &str,
            side: TradeSide,
            quantity: f64,
            limit_price: f64,
        ) -> BrokerResult<BrokerOrderResult> {
            self.placed.lock().unwrap().push((symbol.to_string(), limit_price));
            self.answer.clone().map(|order_id| BrokerOrderResult {
                order_id,
                symbol: symbol.to_string(),
                side,
                quantity,
                price: limit_price,
            })
        }
    }

    struct MockOrderBook {
        enabled: bool,
        limit: Result<f64, OrderBookError>,
    }

    #[async_trait]
    impl OrderBookAnalysis for MockOrderBook {
        async fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn validate_liquidity(&self, _s: &str, _side: TradeSide, _q: f64) -> Result<(), OrderBookError> {
            Ok(())
        }

        async fn calculate_optimal_limit(&self, _s: &str, _side: TradeSide, _b: f64) -> Result<f64, OrderBookError> {
            self.limit.clone()
        }
    }

    #[derive(Default)]
    struct MockRetryStore {
        created: Mutex<Vec<NewPendingRetry>>,
    }

    #[async_trait]
    impl RetryStore for MockRetryStore {
        async fn create_pending_retry(&self, retry: &NewPendingRetry) -> Result<i64, RepositoryError> {
            let mut created = self.created.lock().unwrap();
            created.push(retry.clone());
            Ok(created.len() as i64)
        }

        async fn get_due_retries(&self, _now: DateTime<Utc>) -> Result<Vec<PendingRetry>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn mark_succeeded(&self, _id: i64) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn increment_attempt(&self, _id: i64, _next: DateTime<Utc>) -> Result<RetryStatus, RepositoryError> {
            Ok(RetryStatus::Pending)
        }
    }

    #[derive(Default)]
    struct MockRecorder {
        trades: Mutex<Vec<ExecutedTrade>>,
    }

    #[async_trait]
    impl TradeRecorder for MockRecorder {
        async fn record_trade(&self, trade: &ExecutedTrade) -> Result<i64, RepositoryError> {
            self.trades.lock().unwrap().push(trade.clone());
            Err(RepositoryError::QueryFailed("ledger offline".to_string()))
        }
    }

    fn buy(quantity: f64, price: f64, currency: &str) -> TradeRequest {
        TradeRequest::new("AAPL", TradeSide::Buy, quantity, currency, price, "Portfolio rebalancing").unwrap()
    }

    fn sell(quantity: f64, price: f64) -> TradeRequest {
        TradeRequest::new("AAPL", TradeSide::Sell, quantity, "USD", price, "Take profit").unwrap()
    }

    fn ready_deps(broker: Arc<MockBroker>) -> ExecutionDependencies {
        ExecutionDependencies {
            broker: Some(broker),
            safety: Some(Arc::new(MockGate(Ok(())))),
            cash: Some(Arc::new(MockCash(Ok(1_000_000.0)))),
            exchange_rates: Some(Arc::new(MockRates(Ok(1.0)))),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cash_check_blocks_when_cash_service_missing() {
        let service = TradeExecutionService::new(ExecutionDependencies::default());
        let err = service
            .validate_buy_cash_balance(&buy(10.0, 150.0, "USD"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), TradeStatus::Blocked);
        assert!(err.to_string().contains("blocking BUY for safety"));
    }

    #[tokio::test]
    async fn test_cash_check_blocks_negative_balance() {
        let service = TradeExecutionService::new(ExecutionDependencies {
            cash: Some(Arc::new(MockCash(Ok(-100.0)))),
            ..Default::default()
        });
        let err = service
            .validate_buy_cash_balance(&buy(10.0, 150.0, "USD"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Negative"));
    }

    #[tokio::test]
    async fn test_cash_check_blocks_insufficient_funds() {
        let service = TradeExecutionService::new(ExecutionDependencies {
            cash: Some(Arc::new(MockCash(Ok(1000.0)))),
            exchange_rates: Some(Arc::new(MockRates(Ok(1.0)))),
            ..Default::default()
        });
        let err = service
            .validate_buy_cash_balance(&buy(10.0, 150.0, "USD"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Insufficient"));
    }

    #[tokio::test]
    async fn test_cash_check_allows_sufficient_funds() {
        let service = TradeExecutionService::new(ExecutionDependencies {
            cash: Some(Arc::new(MockCash(Ok(2000.0)))),
            exchange_rates: Some(Arc::new(MockRates(Ok(1.0)))),
            ..Default::default()
        });
        assert!(service
            .validate_buy_cash_balance(&buy(10.0, 150.0, "USD"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cash_check_skips_sell() {
        let service = TradeExecutionService::new(ExecutionDependencies::default());
        assert!(service.validate_buy_cash_balance(&sell(10.0, 150.0)).await.is_ok());
    }

    #[test]
    fn test_is_market_hours_error() {
        let cases = [
            ("Market is closed", true),
            ("market closed", true),
            ("MARKET CLOSED", true),
            ("trading hours have ended", true),
            ("outside trading hours", true),
            ("market not open", true),
            ("exchange closed", true),
            ("trading session closed", true),
            ("after hours trading not allowed", true),
            ("pre-market orders not accepted", true),
            ("Order rejected: invalid quantity", false),
            ("Insufficient funds", false),
            ("Network error", false),
            ("", false),
        ];
        for (message, expected) in cases {
            assert_eq!(is_market_hours_error(message), expected, "{}", message);
        }
    }

    #[test]
    fn test_classify_rejection_decides_retry() {
        let closed = classify_rejection("Order rejected: Market is closed".to_string());
        assert_eq!(
            closed,
            TradeExecutionError::MarketHoursRejection {
                reason: "Order rejected: Market is closed".to_string()
            }
        );
        assert!(closed.is_retryable());
        assert_eq!(closed.severity(), ErrorSeverity::Minor);

        let margin = classify_rejection("Order rejected: insufficient margin".to_string());
        assert!(matches!(margin, TradeExecutionError::OrderPlacementFailed { .. }));
        assert!(!margin.is_retryable());
        assert_eq!(margin.severity(), ErrorSeverity::Critical);
    }

    #[tokio::test]
    async fn test_store_pending_retry() {
        let store = Arc::new(MockRetryStore::default());
        let service = TradeExecutionService::new(ExecutionDependencies {
            retry_store: Some(store.clone()),
            ..Default::default()
        });
        let before = Utc::now();
        service
            .store_pending_retry(&buy(10.0, 150.0, "USD"), "Market is closed")
            .await
            .unwrap();

        let created = store.created.lock().unwrap();
        let retry = &created[0];
        assert_eq!(retry.symbol, "AAPL");
        assert_eq!(retry.side, TradeSide::Buy);
        assert_eq!(retry.quantity, 10.0);
        assert_eq!(retry.estimated_price, 150.0);
        assert_eq!(retry.currency, "USD");
        assert_eq!(retry.reason, "Portfolio rebalancing");
        assert_eq!(retry.failure_reason, "Market is closed");
        assert_eq!(retry.max_attempts, 3);
        assert!(retry.next_retry_at >= before + chrono::Duration::hours(7));
    }

    #[tokio::test]
    async fn test_store_pending_retry_without_store() {
        let service = TradeExecutionService::new(ExecutionDependencies::default());
        let err = service
            .store_pending_retry(&buy(10.0, 150.0, "USD"), "Market closed")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("trade repository not available"));
    }

    #[tokio::test]
    async fn test_commission_in_hub_currency() {
        let service = TradeExecutionService::new(ExecutionDependencies::default());
        let commission = service.calculate_commission(1000.0, "EUR").await;
        assert!((commission - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_commission_converts_fixed_fee() {
        let service = TradeExecutionService::new(ExecutionDependencies {
            exchange_rates: Some(Arc::new(MockRates(Ok(1.1)))),
            ..Default::default()
        });
        let commission = service.calculate_commission(1000.0, "USD").await;
        assert!((commission - 4.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_commission_falls_back_to_unconverted_fee() {
        let failing = TradeExecutionService::new(ExecutionDependencies {
            exchange_rates: Some(Arc::new(MockRates(Err(CurrencyError::UnknownCurrency(
                "GBP".to_string(),
            ))))),
            ..Default::default()
        });
        assert!((failing.calculate_commission(1000.0, "GBP").await - 4.0).abs() < 1e-9);

        let missing = TradeExecutionService::new(ExecutionDependencies::default());
        assert!((missing.calculate_commission(1000.0, "GBP").await - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_success_uses_estimate_fallback_without_order_book() {
        let broker = MockBroker::accepting();
        let service = TradeExecutionService::new(ready_deps(broker.clone()));

        let results = service.execute(&[buy(10.0, 100.0, "USD")]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TradeStatus::Success);
        assert_eq!(results[0].broker_order_id.as_deref(), Some("order-1"));
        assert!((results[0].limit_price.unwrap() - 105.0).abs() < 1e-9);
        assert!((broker.placed.lock().unwrap()[0].1 - 105.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_uses_order_book_limit_when_enabled() {
        let broker = MockBroker::accepting();
        let mut deps = ready_deps(broker.clone());
        deps.order_book = Some(Arc::new(MockOrderBook {
            enabled: true,
            limit: Ok(93.975),
        }));
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[buy(1.0, 100.0, "USD")]).await;
        assert_eq!(results[0].limit_price, Some(93.975));
    }

    #[tokio::test]
    async fn test_execute_skips_disabled_order_book() {
        let broker = MockBroker::accepting();
        let mut deps = ready_deps(broker.clone());
        deps.order_book = Some(Arc::new(MockOrderBook {
            enabled: false,
            limit: Err(OrderBookError::MissingQuote {
                symbol: "AAPL".to_string(),
                book_side: "ask",
            }),
        }));
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[sell(1.0, 100.0)]).await;
        assert_eq!(results[0].status, TradeStatus::Success);
        assert!((results[0].limit_price.unwrap() - 95.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_order_book_rejection_blocks_before_broker() {
        let broker = MockBroker::accepting();
        let mut deps = ready_deps(broker.clone());
        deps.order_book = Some(Arc::new(MockOrderBook {
            enabled: true,
            limit: Err(OrderBookError::Overpaying {
                symbol: "AAPL".to_string(),
                best_ask: 1000.0,
                reference: 100.0,
                discrepancy_pct: 900.0,
                threshold_pct: 50.0,
            }),
        }));
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[buy(1.0, 100.0, "USD")]).await;
        assert_eq!(results[0].status, TradeStatus::Blocked);
        assert!(results[0].error.as_ref().unwrap().contains("overpaying"));
        assert!(broker.placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_safety_gate_never_places() {
        let broker = MockBroker::accepting();
        let mut deps = ready_deps(broker.clone());
        deps.safety = None;
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[sell(1.0, 100.0)]).await;
        assert_eq!(results[0].status, TradeStatus::Blocked);
        assert_eq!(results[0].error.as_deref(), Some("safety service not available"));
        assert!(broker.placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_safety_rejection_is_blocked_with_message() {
        let broker = MockBroker::accepting();
        let mut deps = ready_deps(broker.clone());
        deps.safety = Some(Arc::new(MockGate(Err(SafetyError::SecurityNotFound {
            symbol: "AAPL".to_string(),
        }))));
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[buy(1.0, 100.0, "USD")]).await;
        assert_eq!(results[0].status, TradeStatus::Blocked);
        assert_eq!(results[0].error.as_deref(), Some("security not found: AAPL"));
    }

    #[tokio::test]
    async fn test_missing_broker_blocks() {
        let mut deps = ready_deps(MockBroker::accepting());
        deps.broker = None;
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[sell(1.0, 100.0)]).await;
        assert_eq!(results[0].status, TradeStatus::Blocked);
        assert_eq!(results[0].error.as_deref(), Some("broker not available"));
    }

    #[tokio::test]
    async fn test_zero_estimated_price_without_order_book_is_blocked() {
        let broker = MockBroker::accepting();
        let service = TradeExecutionService::new(ready_deps(broker.clone()));

        let results = service.execute(&[sell(1.0, 0.0)]).await;
        assert_eq!(results[0].status, TradeStatus::Blocked);
        assert!(broker.placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_market_closed_failure_schedules_retry() {
        let broker = MockBroker::answering(Err(BrokerError::OrderRejected(
            "Market is closed".to_string(),
        )));
        let store = Arc::new(MockRetryStore::default());
        let mut deps = ready_deps(broker);
        deps.retry_store = Some(store.clone());
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[buy(1.0, 100.0, "USD")]).await;
        assert_eq!(results[0].status, TradeStatus::Failed);
        assert!(results[0].retry_scheduled);
        let created = store.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert!(created[0].failure_reason.contains("Market is closed"));
    }

    #[tokio::test]
    async fn test_retry_execution_does_not_queue_again() {
        let broker = MockBroker::answering(Err(BrokerError::OrderRejected(
            "outside trading hours".to_string(),
        )));
        let store = Arc::new(MockRetryStore::default());
        let mut deps = ready_deps(broker);
        deps.retry_store = Some(store.clone());
        let service = TradeExecutionService::new(deps);

        let result = service.execute_retry(&buy(1.0, 100.0, "USD")).await;
        assert_eq!(result.status, TradeStatus::Failed);
        assert!(!result.retry_scheduled);
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let broker = MockBroker::answering(Err(BrokerError::OrderRejected(
            "invalid quantity".to_string(),
        )));
        let store = Arc::new(MockRetryStore::default());
        let mut deps = ready_deps(broker);
        deps.retry_store = Some(store.clone());
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[buy(1.0, 100.0, "USD")]).await;
        assert_eq!(results[0].status, TradeStatus::Failed);
        assert!(!results[0].retry_scheduled);
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_request_order() {
        let broker = MockBroker::accepting();
        let mut deps = ready_deps(broker);
        deps.cash = Some(Arc::new(MockCash(Ok(-1.0))));
        let service = TradeExecutionService::new(deps);

        let results = service
            .execute(&[buy(1.0, 100.0, "USD"), sell(1.0, 100.0), buy(2.0, 100.0, "USD")])
            .await;
        let statuses: Vec<TradeStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![TradeStatus::Blocked, TradeStatus::Success, TradeStatus::Blocked]
        );
        assert_eq!(results[1].side, TradeSide::Sell);
    }

    #[tokio::test]
    async fn test_recorder_failure_does_not_change_result() {
        let recorder = Arc::new(MockRecorder::default());
        let mut deps = ready_deps(MockBroker::accepting());
        deps.recorder = Some(recorder.clone());
        let service = TradeExecutionService::new(deps);

        let results = service.execute(&[sell(3.0, 100.0)]).await;
        assert_eq!(results[0].status, TradeStatus::Success);
        let trades = recorder.trades.lock().unwrap();
        assert_eq!(trades[0].broker_order_id, "order-1");
        assert_eq!(trades[0].quantity, 3.0);
    }
}
