use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::pending_retry::{NewPendingRetry, PendingRetry, RetryStatus};
use crate::domain::entities::trade::ExecutedTrade;
use crate::domain::errors::RepositoryError;

/// Durable queue of failed orders
#[async_trait]
pub trait RetryStore: Send + Sync {
    async fn create_pending_retry(&self, retry: &NewPendingRetry) -> Result<i64, RepositoryError>;

    /// Pending rows with `next_retry_at <= now`, oldest first
    async fn get_due_retries(&self, now: DateTime<Utc>) -> Result<Vec<PendingRetry>, RepositoryError>;

    async fn mark_succeeded(&self, id: i64) -> Result<(), RepositoryError>;

    /// Count one more failed attempt. The row flips to `failed` once the
    /// count reaches `max_attempts`, otherwise it stays pending until
    /// `next_retry_at`. Returns the resulting status.
    async fn increment_attempt(
        &self,
        id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<RetryStatus, RepositoryError>;
}

#[async_trait]
pub trait TradeRecorder: Send + Sync {
    async fn record_trade(&self, trade: &ExecutedTrade) -> Result<i64, RepositoryError>;
}
