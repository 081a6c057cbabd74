//! Shared fakes for the integration tests
//!
//! Broker-side capabilities are faked in memory; everything the pipeline
//! persists goes through the real SQLite repositories.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sentinel::domain::entities::order_book::{BrokerOrderBook, OrderBookLevel};
use sentinel::domain::entities::security::{Position, Security};
use sentinel::domain::entities::trade::TradeSide;
use sentinel::domain::errors::RepositoryError;
use sentinel::domain::repositories::broker::{
    BrokerError, BrokerOrderResult, BrokerResult, OrderBookSource, OrderPlacement,
};
use sentinel::domain::repositories::market_data::{
    MarketHoursAdvisory, QuoteSource, ReferencePriceSource,
};
use sentinel::domain::repositories::portfolio::{CashBalance, PositionLookup, SecurityLookup};
use sentinel::persistence::{
    init_database, DbPool, SqliteRetryStore, SqliteSettingsRepository, SqliteTradeRepository,
};

pub struct Securities(pub Vec<&'static str>);

#[async_trait]
impl SecurityLookup for Securities {
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Security>, RepositoryError> {
        Ok(self.0.iter().find(|s| **s == symbol).map(|s| Security {
            symbol: s.to_string(),
            name: format!("{} Inc", s),
            currency: "USD".to_string(),
            exchange: "XNAS".to_string(),
        }))
    }
}

pub struct Positions(pub HashMap<String, f64>);

#[async_trait]
impl PositionLookup for Positions {
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Position>, RepositoryError> {
        Ok(self.0.get(symbol).map(|quantity| Position {
            symbol: symbol.to_string(),
            quantity: *quantity,
            average_price: 90.0,
            currency: "USD".to_string(),
        }))
    }
}

pub struct AlwaysOpen;

#[async_trait]
impl MarketHoursAdvisory for AlwaysOpen {
    async fn is_open(&self, _symbol: &str) -> Result<bool, RepositoryError> {
        Ok(true)
    }
}

pub struct Cash(pub f64);

#[async_trait]
impl CashBalance for Cash {
    async fn get_balance(&self, _currency: &str) -> Result<f64, RepositoryError> {
        Ok(self.0)
    }
}

pub struct Quotes(pub HashMap<&'static str, f64>);

#[async_trait]
impl QuoteSource for Quotes {
    async fn get_quote(&self, pair_symbol: &str) -> Result<f64, RepositoryError> {
        self.0
            .get(pair_symbol)
            .copied()
            .ok_or_else(|| RepositoryError::NotFound(pair_symbol.to_string()))
    }
}

pub struct ReferenceFeed(pub f64);

#[async_trait]
impl ReferencePriceSource for ReferenceFeed {
    async fn get_price(&self, _symbol: &str, _max_retries: u32) -> Result<Option<f64>, RepositoryError> {
        Ok(Some(self.0))
    }
}

/// One bid and one ask, 50 shares each
pub struct Book {
    pub bid: f64,
    pub ask: f64,
}

#[async_trait]
impl OrderBookSource for Book {
    async fn get_order_book(&self, symbol: &str) -> BrokerResult<BrokerOrderBook> {
        Ok(BrokerOrderBook::new(
            symbol,
            vec![OrderBookLevel::new(self.bid, 50.0, 1)],
            vec![OrderBookLevel::new(self.ask, 50.0, 1)],
        ))
    }
}

/// Broker that answers from a script, then accepts everything
#[derive(Default)]
pub struct ScriptedBroker {
    script: Mutex<VecDeque<BrokerError>>,
    pub placed: Mutex<Vec<(String, TradeSide, f64, f64)>>,
    next_id: AtomicUsize,
}

impl ScriptedBroker {
    pub fn rejecting(errors: Vec<BrokerError>) -> Self {
        Self {
            script: Mutex::new(errors.into()),
            ..Self::default()
        }
    }

    pub fn placed_count(&self) -> usize {
        self.placed.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderPlacement for ScriptedBroker {
    async fn place_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
        limit_price: f64,
    ) -> BrokerResult<BrokerOrderResult> {
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.placed
            .lock()
            .unwrap()
            .push((symbol.to_string(), side, quantity, limit_price));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(BrokerOrderResult {
            order_id: format!("ORD-{}", id),
            symbol: symbol.to_string(),
            side,
            quantity,
            price: limit_price,
        })
    }
}

pub fn market_closed() -> BrokerError {
    BrokerError::OrderRejected("Market is closed for AAPL.US".to_string())
}

pub struct Stores {
    pub pool: DbPool,
    pub retries: Arc<SqliteRetryStore>,
    pub trades: Arc<SqliteTradeRepository>,
    pub settings: Arc<SqliteSettingsRepository>,
}

pub async fn stores() -> Stores {
    let pool = init_database("sqlite::memory:").await.unwrap();
    Stores {
        retries: Arc::new(SqliteRetryStore::new(pool.clone())),
        trades: Arc::new(SqliteTradeRepository::new(pool.clone())),
        settings: Arc::new(SqliteSettingsRepository::new(pool.clone())),
        pool,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
