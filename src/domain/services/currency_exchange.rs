//! Currency routing and conversion
//!
//! Conversions run over a star graph: every supported currency is quoted
//! against the EUR hub, plus a couple of direct crosses. A pair of currencies
//! is either identical (no steps), directly quoted (one step) or routed
//! through the hub (two steps).

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entities::currency::{ConversionStep, CurrencyPair};
use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::CurrencyError;
use crate::domain::repositories::broker::{BrokerOrderResult, OrderPlacement};
use crate::domain::repositories::market_data::QuoteSource;
use crate::domain::services::fail_safe::{Capability, Dependency};

pub const HUB_CURRENCY: &str = "EUR";

/// Market orders are placed with a zero limit price
const MARKET_ORDER: f64 = 0.0;

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Units of `to` per one unit of `from`
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError>;
}

pub struct CurrencyExchangeService {
    pairs: Vec<CurrencyPair>,
    quotes: Dependency<dyn QuoteSource>,
    broker: Dependency<dyn OrderPlacement>,
}

impl CurrencyExchangeService {
    pub fn new(
        quotes: Option<Arc<dyn QuoteSource>>,
        broker: Option<Arc<dyn OrderPlacement>>,
    ) -> Self {
        Self {
            pairs: vec![
                CurrencyPair::new("EUR", "USD"),
                CurrencyPair::new("EUR", "GBP"),
                CurrencyPair::new("EUR", "HKD"),
                CurrencyPair::new("GBP", "USD"),
                CurrencyPair::new("USD", "HKD"),
            ],
            quotes: Dependency::new(Capability::QuoteSource, quotes),
            broker: Dependency::new(Capability::OrderPlacement, broker),
        }
    }

    /// Supported currency codes, sorted
    pub fn get_available_currencies(&self) -> Vec<String> {
        let mut currencies: Vec<String> = self
            .pairs
            .iter()
            .flat_map(|pair| [pair.base.clone(), pair.quote.clone()])
            .collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }

    fn is_supported(&self, currency: &str) -> bool {
        self.pairs
            .iter()
            .any(|pair| pair.base == currency || pair.quote == currency)
    }

    /// Quoted symbol linking `from` and `to`, and whether the quote must be
    /// inverted to read it as `from -> to`.
    pub fn find_rate_symbol(&self, from: &str, to: &str) -> Option<(String, bool)> {
        self.pairs
            .iter()
            .find(|pair| pair.connects(from, to))
            .map(|pair| (pair.symbol.clone(), pair.base != from))
    }

    fn direct_step(&self, from: &str, to: &str) -> Option<ConversionStep> {
        self.find_rate_symbol(from, to)
            .map(|(symbol, inverse)| ConversionStep {
                symbol,
                // base -> quote buys the pair
                action: if inverse { TradeSide::Sell } else { TradeSide::Buy },
                from_currency: from.to_string(),
                to_currency: to.to_string(),
            })
    }

    pub fn get_conversion_path(&self, from: &str, to: &str) -> Result<Vec<ConversionStep>, CurrencyError> {
        for currency in [from, to] {
            if !self.is_supported(currency) {
                return Err(CurrencyError::UnknownCurrency(currency.to_string()));
            }
        }

        if from == to {
            return Ok(Vec::new());
        }

        if let Some(step) = self.direct_step(from, to) {
            return Ok(vec![step]);
        }

        match (self.direct_step(from, HUB_CURRENCY), self.direct_step(HUB_CURRENCY, to)) {
            (Some(first), Some(second)) => Ok(vec![first, second]),
            _ => Err(CurrencyError::NoConversionPath {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    async fn step_rate(&self, step: &ConversionStep) -> Result<f64, CurrencyError> {
        let quotes = self.quotes.require()?;
        let quote = quotes
            .get_quote(&step.symbol)
            .await
            .map_err(|e| CurrencyError::RateUnavailable {
                symbol: step.symbol.clone(),
                reason: e.to_string(),
            })?;

        if !quote.is_finite() || quote <= 0.0 {
            return Err(CurrencyError::InvalidRate {
                symbol: step.symbol.clone(),
                rate: quote,
            });
        }

        Ok(match step.action {
            TradeSide::Buy => quote,
            TradeSide::Sell => 1.0 / quote,
        })
    }

    /// Convert `amount` of `from` into `to` by placing one market order per
    /// step. Each step's amount is the previous amount times its rate.
    ///
    /// Every rate on the path is resolved before the first order goes out,
    /// so a missing quote places nothing. A broker failure after the first
    /// leg returns `PartialConversion` with the legs that were filled.
    pub async fn exchange(
        &self,
        from: &str,
        to: &str,
        amount: f64,
    ) -> Result<Vec<BrokerOrderResult>, CurrencyError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CurrencyError::InvalidAmount(amount));
        }

        let path = self.get_conversion_path(from, to)?;
        if path.is_empty() {
            return Ok(Vec::new());
        }

        let broker = self.broker.require()?;
        let mut rates = Vec::with_capacity(path.len());
        for step in &path {
            rates.push(self.step_rate(step).await?);
        }

        let mut step_amount = amount;
        let mut results: Vec<BrokerOrderResult> = Vec::with_capacity(path.len());

        for (step, rate) in path.iter().zip(rates) {
            tracing::info!(
                "Converting {:.2} {} to {} via {} ({})",
                step_amount,
                step.from_currency,
                step.to_currency,
                step.symbol,
                step.action
            );

            match broker
                .place_order(&step.symbol, step.action, step_amount, MARKET_ORDER)
                .await
            {
                Ok(result) => results.push(result),
                Err(e) if results.is_empty() => {
                    tracing::error!("Currency conversion step {} failed: {}", step.symbol, e);
                    return Err(CurrencyError::StepFailed {
                        symbol: step.symbol.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(
                        "Currency conversion stopped at {} after {} filled leg(s), holding {:.2} {}: {}",
                        step.symbol,
                        results.len(),
                        step_amount,
                        step.from_currency,
                        e
                    );
                    return Err(CurrencyError::PartialConversion {
                        completed: results,
                        symbol: step.symbol.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            step_amount *= rate;
        }

        tracing::info!(
            "Converted {:.2} {} into approximately {:.2} {}",
            amount,
            from,
            step_amount,
            to
        );
        Ok(results)
    }
}

#[async_trait]
impl ExchangeRateProvider for CurrencyExchangeService {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, CurrencyError> {
        let path = self.get_conversion_path(from, to)?;

        let mut rate = 1.0;
        for step in &path {
            rate *= self.step_rate(step).await?;
        }
        Ok(rate)
    }
}
