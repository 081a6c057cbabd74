//! Wiring for the trade pipeline
//!
//! Builds every service from a `TradingConfig`, a database pool and the
//! market-side connections the host application owns. Anything left out of
//! `MarketConnections` is handled by the fail-safe table.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::jobs::retry_trades::RetryTradesJob;
use crate::config::TradingConfig;
use crate::domain::errors::RepositoryError;
use crate::domain::repositories::broker::{OrderBookSource, OrderPlacement};
use crate::domain::repositories::market_data::{
    MarketHoursAdvisory, QuoteSource, ReferencePriceSource,
};
use crate::domain::repositories::portfolio::{CashBalance, PositionLookup, SecurityLookup};
use crate::domain::repositories::settings::SettingsSource;
use crate::domain::services::currency_exchange::CurrencyExchangeService;
use crate::domain::services::order_book_validator::OrderBookValidator;
use crate::domain::services::reference_price::ReferencePriceValidator;
use crate::domain::services::trade_execution::{
    ExecutionDependencies, RetryPolicy, TradeExecutionService,
};
use crate::domain::services::trade_safety::{SafetyDependencies, TradeSafetyService};
use crate::persistence::{
    init_database_with, DatabaseConfig, DatabaseError, DbPool, SqliteRetryStore,
    SqliteSettingsRepository, SqliteTradeRepository,
};
use crate::task_runner::{run_periodic, PeriodicTaskConfig};

/// Broker and market data capabilities supplied by the host
#[derive(Default, Clone)]
pub struct MarketConnections {
    pub broker: Option<Arc<dyn OrderPlacement>>,
    pub order_books: Option<Arc<dyn OrderBookSource>>,
    pub reference_prices: Option<Arc<dyn ReferencePriceSource>>,
    pub quotes: Option<Arc<dyn QuoteSource>>,
    pub securities: Option<Arc<dyn SecurityLookup>>,
    pub positions: Option<Arc<dyn PositionLookup>>,
    pub market_hours: Option<Arc<dyn MarketHoursAdvisory>>,
    pub cash: Option<Arc<dyn CashBalance>>,
}

/// Stored settings first, then the loaded configuration
struct LayeredSettings {
    stored: Arc<SqliteSettingsRepository>,
    config: Arc<TradingConfig>,
}

#[async_trait]
impl SettingsSource for LayeredSettings {
    async fn get_setting(&self, key: &str) -> Result<Option<f64>, RepositoryError> {
        match self.stored.get_setting(key).await {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => self.config.get_setting(key).await,
            Err(e) => {
                warn!("Settings table unavailable for {}: {}, using configuration", key, e);
                self.config.get_setting(key).await
            }
        }
    }
}

pub struct TradePipeline {
    config: Arc<TradingConfig>,
    executor: Arc<TradeExecutionService>,
    currency_exchange: Arc<CurrencyExchangeService>,
    retry_store: Arc<SqliteRetryStore>,
    trades: Arc<SqliteTradeRepository>,
    settings: Arc<SqliteSettingsRepository>,
}

impl TradePipeline {
    pub fn new(config: TradingConfig, pool: DbPool, connections: MarketConnections) -> Self {
        let config = Arc::new(config);
        let retry_store = Arc::new(SqliteRetryStore::new(pool.clone()));
        let trades = Arc::new(SqliteTradeRepository::new(pool.clone()));
        let settings = Arc::new(SqliteSettingsRepository::new(pool));
        let layered: Arc<dyn SettingsSource> = Arc::new(LayeredSettings {
            stored: settings.clone(),
            config: config.clone(),
        });

        let safety = TradeSafetyService::new(SafetyDependencies {
            securities: connections.securities,
            positions: connections.positions,
            pending_orders: Some(trades.clone()),
            market_hours: connections.market_hours,
        });

        let order_book = OrderBookValidator::new(
            connections.order_books,
            connections
                .reference_prices
                .map(|source| Arc::new(ReferencePriceValidator::new(source))),
            Some(layered.clone()),
        );

        let currency_exchange = Arc::new(CurrencyExchangeService::new(
            connections.quotes,
            connections.broker.clone(),
        ));

        let executor = TradeExecutionService::new(ExecutionDependencies {
            broker: connections.broker,
            safety: Some(Arc::new(safety)),
            order_book: Some(Arc::new(order_book)),
            cash: connections.cash,
            exchange_rates: Some(currency_exchange.clone()),
            retry_store: Some(retry_store.clone()),
            recorder: Some(trades.clone()),
            settings: Some(layered),
        })
        .with_retry_policy(RetryPolicy::from(&*config))
        .with_hub_currency(config.hub_currency.clone());

        info!(
            "Trade pipeline ready (hub {}, retry every {}h, {} attempts)",
            config.hub_currency, config.retry_interval_hours, config.max_retry_attempts
        );

        Self {
            config,
            executor: Arc::new(executor),
            currency_exchange,
            retry_store,
            trades,
            settings,
        }
    }

    /// Load `.env` and the environment, open the database and wire everything
    pub async fn from_env(connections: MarketConnections) -> Result<Self, DatabaseError> {
        let config = TradingConfig::load();
        let pool = init_database_with(&DatabaseConfig::from_env()).await?;
        Ok(Self::new(config, pool, connections))
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn executor(&self) -> Arc<TradeExecutionService> {
        self.executor.clone()
    }

    pub fn currency_exchange(&self) -> Arc<CurrencyExchangeService> {
        self.currency_exchange.clone()
    }

    pub fn retry_store(&self) -> &Arc<SqliteRetryStore> {
        &self.retry_store
    }

    pub fn trades(&self) -> &Arc<SqliteTradeRepository> {
        &self.trades
    }

    pub fn settings(&self) -> &Arc<SqliteSettingsRepository> {
        &self.settings
    }

    pub fn retry_job(&self) -> RetryTradesJob {
        RetryTradesJob::new(Some(self.retry_store.clone()), Some(self.executor.clone()))
            .with_retry_interval(self.config.retry_interval_chrono())
    }

    /// Start the retry sweep on the configured interval
    pub fn spawn_retry_job(&self) -> JoinHandle<()> {
        run_periodic(
            Arc::new(self.retry_job()),
            PeriodicTaskConfig::every(self.config.retry_interval()),
        )
    }
}
