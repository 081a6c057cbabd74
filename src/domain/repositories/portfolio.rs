use async_trait::async_trait;

use crate::domain::entities::security::{Position, Security};
use crate::domain::errors::RepositoryError;

#[async_trait]
pub trait SecurityLookup: Send + Sync {
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Security>, RepositoryError>;
}

#[async_trait]
pub trait PositionLookup: Send + Sync {
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Position>, RepositoryError>;
}

#[async_trait]
pub trait PendingOrderLookup: Send + Sync {
    async fn has_open_order(&self, symbol: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CashBalance: Send + Sync {
    /// Available cash in `currency`. May be negative.
    async fn get_balance(&self, currency: &str) -> Result<f64, RepositoryError>;
}
