//! Pre-trade safety gate
//!
//! Every order passes through `validate_trade` before it reaches the broker.
//! The checks run in a fixed order and stop at the first rejection:
//!
//! 1. the security must exist
//! 2. SELL only: the held position must cover the quantity and no other
//!    order for the symbol may be open
//! 3. if a market hours advisory is wired, a firm "closed" answer blocks
//!
//! The service holds no state, so repeated calls with the same inputs give the
//! same answer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::SafetyError;
use crate::domain::repositories::market_data::MarketHoursAdvisory;
use crate::domain::repositories::portfolio::{PendingOrderLookup, PositionLookup, SecurityLookup};
use crate::domain::services::fail_safe::{Capability, Dependency};

#[async_trait]
pub trait TradeGate: Send + Sync {
    async fn validate_trade(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<(), SafetyError>;
}

/// Collaborators for the safety gate. Any of them may be left out.
#[derive(Default, Clone)]
pub struct SafetyDependencies {
    pub securities: Option<Arc<dyn SecurityLookup>>,
    pub positions: Option<Arc<dyn PositionLookup>>,
    pub pending_orders: Option<Arc<dyn PendingOrderLookup>>,
    pub market_hours: Option<Arc<dyn MarketHoursAdvisory>>,
}

pub struct TradeSafetyService {
    securities: Dependency<dyn SecurityLookup>,
    positions: Dependency<dyn PositionLookup>,
    pending_orders: Dependency<dyn PendingOrderLookup>,
    market_hours: Dependency<dyn MarketHoursAdvisory>,
}

impl TradeSafetyService {
    pub fn new(deps: SafetyDependencies) -> Self {
        Self {
            securities: Dependency::new(Capability::SecurityLookup, deps.securities),
            positions: Dependency::new(Capability::PositionLookup, deps.positions),
            pending_orders: Dependency::new(Capability::PendingOrderLookup, deps.pending_orders),
            market_hours: Dependency::new(Capability::MarketHours, deps.market_hours),
        }
    }

    async fn check_security_exists(&self, symbol: &str) -> Result<(), SafetyError> {
        let securities = self.securities.require()?;
        let security = securities
            .get_by_symbol(symbol)
            .await
            .map_err(|source| SafetyError::LookupFailed {
                check: "security",
                symbol: symbol.to_string(),
                source,
            })?;

        match security {
            Some(_) => Ok(()),
            None => Err(SafetyError::SecurityNotFound {
                symbol: symbol.to_string(),
            }),
        }
    }

    async fn check_position_covers(&self, symbol: &str, quantity: f64) -> Result<(), SafetyError> {
        let positions = self.positions.require()?;
        let position = positions
            .get_by_symbol(symbol)
            .await
            .map_err(|source| SafetyError::LookupFailed {
                check: "position",
                symbol: symbol.to_string(),
                source,
            })?;

        match position {
            Some(position) if position.covers(quantity) => Ok(()),
            other => Err(SafetyError::ExceedsPosition {
                symbol: symbol.to_string(),
                requested: quantity,
                held: other.map(|p| p.quantity).unwrap_or(0.0),
            }),
        }
    }

    async fn check_no_open_order(&self, symbol: &str) -> Result<(), SafetyError> {
        let pending_orders = self.pending_orders.require()?;
        let has_open = pending_orders
            .has_open_order(symbol)
            .await
            .map_err(|source| SafetyError::LookupFailed {
                check: "pending order",
                symbol: symbol.to_string(),
                source,
            })?;

        if has_open {
            return Err(SafetyError::OpenOrderConflict {
                symbol: symbol.to_string(),
            });
        }
        Ok(())
    }

    async fn check_market_hours(&self, symbol: &str) -> Result<(), SafetyError> {
        let Some(market_hours) = self.market_hours.resolve()? else {
            return Ok(());
        };

        match market_hours.is_open(symbol).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SafetyError::MarketClosed {
                symbol: symbol.to_string(),
            }),
            Err(e) => {
                // advisory only: an unreachable calendar never blocks a trade
                tracing::warn!("Market hours check failed for {}: {}, allowing trade", symbol, e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TradeGate for TradeSafetyService {
    async fn validate_trade(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<(), SafetyError> {
        self.check_security_exists(symbol).await?;

        if side == TradeSide::Sell {
            self.check_position_covers(symbol, quantity).await?;
            self.check_no_open_order(symbol).await?;
        }

        self.check_market_hours(symbol).await?;

        tracing::debug!("Safety checks passed for {} {} {}", side, quantity, symbol);
        Ok(())
    }
}
