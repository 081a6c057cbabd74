//! Database Models
//!
//! Row types for the retry queue and the trade log. Conversion into domain
//! entities validates the text columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::entities::pending_retry::{PendingRetry, RetryStatus};
use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::RepositoryError;

/// Pending retry record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingRetryRecord {
    pub id: i64,
    pub symbol: String,
    pub side: String, // "BUY" or "SELL"
    pub quantity: f64,
    pub estimated_price: f64,
    pub currency: String,
    pub reason: String,
    pub failure_reason: String,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub status: String,
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PendingRetryRecord> for PendingRetry {
    type Error = RepositoryError;

    fn try_from(record: PendingRetryRecord) -> Result<Self, Self::Error> {
        let side: TradeSide = record.side.parse().map_err(|_| {
            RepositoryError::QueryFailed(format!(
                "pending retry {} has invalid side '{}'",
                record.id, record.side
            ))
        })?;
        let status: RetryStatus = record.status.parse().map_err(|_| {
            RepositoryError::QueryFailed(format!(
                "pending retry {} has invalid status '{}'",
                record.id, record.status
            ))
        })?;

        Ok(PendingRetry {
            id: record.id,
            symbol: record.symbol,
            side,
            quantity: record.quantity,
            estimated_price: record.estimated_price,
            currency: record.currency,
            reason: record.reason,
            failure_reason: record.failure_reason,
            attempt_count: record.attempt_count,
            max_attempts: record.max_attempts,
            status,
            next_retry_at: record.next_retry_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Trade log record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
    pub price: f64,
    pub currency: String,
    pub broker_order_id: String,
    pub reason: String,
    pub status: String, // "submitted", "filled" or "cancelled"
    pub executed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.status == TRADE_STATUS_SUBMITTED
    }
}

pub const TRADE_STATUS_SUBMITTED: &str = "submitted";
pub const TRADE_STATUS_FILLED: &str = "filled";
pub const TRADE_STATUS_CANCELLED: &str = "cancelled";

/// Setting record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettingRecord {
    pub key: String,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
}
