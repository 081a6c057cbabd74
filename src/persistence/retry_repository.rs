//! SQLite-backed retry queue

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::models::PendingRetryRecord;
use super::{query_failed, DbPool};
use crate::domain::entities::pending_retry::{NewPendingRetry, PendingRetry, RetryStatus};
use crate::domain::errors::RepositoryError;
use crate::domain::repositories::retry_store::RetryStore;

pub struct SqliteRetryStore {
    pool: DbPool,
}

impl SqliteRetryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a retry by ID regardless of status
    pub async fn get(&self, id: i64) -> Result<Option<PendingRetry>, RepositoryError> {
        let record = sqlx::query_as::<_, PendingRetryRecord>(
            "SELECT * FROM pending_retries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to get pending retry", e))?;

        record.map(PendingRetry::try_from).transpose()
    }

    pub async fn count_by_status(&self, status: RetryStatus) -> Result<i64, RepositoryError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_retries WHERE status = ?1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_failed("Failed to count pending retries", e))?;
        Ok(count)
    }
}

#[async_trait]
impl RetryStore for SqliteRetryStore {
    async fn create_pending_retry(&self, retry: &NewPendingRetry) -> Result<i64, RepositoryError> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO pending_retries (
                symbol, side, quantity, estimated_price, currency, reason,
                failure_reason, attempt_count, max_attempts, status,
                next_retry_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, 'pending', ?9, ?10, ?10)
            "#,
        )
        .bind(&retry.symbol)
        .bind(retry.side.as_str())
        .bind(retry.quantity)
        .bind(retry.estimated_price)
        .bind(&retry.currency)
        .bind(&retry.reason)
        .bind(&retry.failure_reason)
        .bind(retry.max_attempts)
        .bind(retry.next_retry_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to create pending retry", e))?
        .last_insert_rowid();

        debug!(
            "Stored pending retry {} for {} {} (next at {})",
            id, retry.side, retry.symbol, retry.next_retry_at
        );
        Ok(id)
    }

    async fn get_due_retries(&self, now: DateTime<Utc>) -> Result<Vec<PendingRetry>, RepositoryError> {
        let records = sqlx::query_as::<_, PendingRetryRecord>(
            r#"
            SELECT * FROM pending_retries
            WHERE status = 'pending' AND next_retry_at <= ?1
            ORDER BY next_retry_at ASC, id ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to load due retries", e))?;

        records.into_iter().map(PendingRetry::try_from).collect()
    }

    async fn mark_succeeded(&self, id: i64) -> Result<(), RepositoryError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE pending_retries
            SET status = 'succeeded', updated_at = ?1
            WHERE id = ?2 AND status = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to mark retry succeeded", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!(
                "pending retry {}",
                id
            )));
        }

        debug!("Pending retry {} succeeded", id);
        Ok(())
    }

    async fn increment_attempt(
        &self,
        id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<RetryStatus, RepositoryError> {
        let status: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE pending_retries
            SET attempt_count = attempt_count + 1,
                status = CASE WHEN attempt_count + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                next_retry_at = ?1,
                updated_at = ?2
            WHERE id = ?3 AND status = 'pending'
            RETURNING status
            "#,
        )
        .bind(next_retry_at)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to increment retry attempt", e))?;

        let Some((status,)) = status else {
            return Err(RepositoryError::NotFound(format!(
                "pending retry {}",
                id
            )));
        };

        let status: RetryStatus = status.parse().map_err(|_| {
            RepositoryError::QueryFailed(format!(
                "pending retry {} returned invalid status '{}'",
                id, status
            ))
        })?;
        debug!("Pending retry {} is now {}", id, status);
        Ok(status)
    }
}
