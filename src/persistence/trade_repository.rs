//! Trade log
//!
//! Every order the broker accepted is recorded as `submitted`. Until it is
//! marked filled or cancelled it counts as an open order for its symbol,
//! which is what the safety gate consults before allowing a SELL.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::models::{
    TradeRecord, TRADE_STATUS_CANCELLED, TRADE_STATUS_FILLED, TRADE_STATUS_SUBMITTED,
};
use super::{query_failed, DbPool};
use crate::domain::entities::trade::ExecutedTrade;
use crate::domain::errors::RepositoryError;
use crate::domain::repositories::portfolio::PendingOrderLookup;
use crate::domain::repositories::retry_store::TradeRecorder;

pub struct SqliteTradeRepository {
    pool: DbPool,
}

impl SqliteTradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<TradeRecord>, RepositoryError> {
        sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to get trade", e))
    }

    /// Most recent trades first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<TradeRecord>, RepositoryError> {
        sqlx::query_as::<_, TradeRecord>(
            "SELECT * FROM trades ORDER BY executed_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to get recent trades", e))
    }

    pub async fn mark_filled(&self, id: i64) -> Result<(), RepositoryError> {
        self.close(id, TRADE_STATUS_FILLED).await
    }

    pub async fn mark_cancelled(&self, id: i64) -> Result<(), RepositoryError> {
        self.close(id, TRADE_STATUS_CANCELLED).await
    }

    async fn close(&self, id: i64, status: &str) -> Result<(), RepositoryError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE trades
            SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(TRADE_STATUS_SUBMITTED)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to update trade status", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!(
                "open trade {}",
                id
            )));
        }

        debug!("Trade {} is now {}", id, status);
        Ok(())
    }
}

#[async_trait]
impl TradeRecorder for SqliteTradeRepository {
    async fn record_trade(&self, trade: &ExecutedTrade) -> Result<i64, RepositoryError> {
        let id = sqlx::query(
            r#"
            INSERT INTO trades (
                symbol, side, quantity, price, currency, broker_order_id,
                reason, status, executed_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(&trade.currency)
        .bind(&trade.broker_order_id)
        .bind(&trade.reason)
        .bind(TRADE_STATUS_SUBMITTED)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to record trade", e))?
        .last_insert_rowid();

        info!(
            "Recorded trade {}: {} {} {} @ {:.4} (order {})",
            id, trade.side, trade.quantity, trade.symbol, trade.price, trade.broker_order_id
        );
        Ok(id)
    }
}

#[async_trait]
impl PendingOrderLookup for SqliteTradeRepository {
    async fn has_open_order(&self, symbol: &str) -> Result<bool, RepositoryError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trades WHERE symbol = ?1 AND status = ?2")
                .bind(symbol)
                .bind(TRADE_STATUS_SUBMITTED)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_failed("Failed to check open orders", e))?;
        Ok(count > 0)
    }
}
