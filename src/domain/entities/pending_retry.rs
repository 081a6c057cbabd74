use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::ValidationError;

pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::Pending => "pending",
            RetryStatus::Succeeded => "succeeded",
            RetryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryStatus::Pending)
    }
}

impl std::fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RetryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RetryStatus::Pending),
            "succeeded" => Ok(RetryStatus::Succeeded),
            "failed" => Ok(RetryStatus::Failed),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// A failed order waiting to be re-driven
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRetry {
    pub id: i64,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub estimated_price: f64,
    pub currency: String,
    pub reason: String,
    pub failure_reason: String,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub status: RetryStatus,
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingRetry {
    /// 1-based number of the attempt about to run
    pub fn next_attempt_number(&self) -> i64 {
        self.attempt_count + 1
    }

    pub fn retry_reason(&self) -> String {
        format!(
            "Retry attempt {}/{}: {}",
            self.next_attempt_number(),
            self.max_attempts,
            self.reason
        )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RetryStatus::Pending && self.next_retry_at <= now
    }
}

/// Insert payload for a new retry row
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingRetry {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub estimated_price: f64,
    pub currency: String,
    pub reason: String,
    pub failure_reason: String,
    pub max_attempts: i64,
    pub next_retry_at: DateTime<Utc>,
}
