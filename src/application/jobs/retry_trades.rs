//! Retry sweep for orders refused outside market hours
//!
//! Each run picks up every pending retry that is due, re-drives it through
//! the execution service once and books the outcome on the retry row. A
//! failure on one row is logged and the sweep moves on to the next.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::application::jobs::{Job, JobError};
use crate::domain::entities::pending_retry::PendingRetry;
use crate::domain::entities::trade::TradeRequest;
use crate::domain::repositories::retry_store::RetryStore;
use crate::domain::services::fail_safe::{Capability, Dependency};
use crate::domain::services::trade_execution::TradeExecutor;

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrySweepReport {
    pub due: usize,
    pub succeeded: usize,
    /// Failed again but still has attempts left
    pub retried: usize,
    /// Used up its last attempt
    pub failed: usize,
    /// Bookkeeping errors; the row is left as it was
    pub errors: usize,
}

pub struct RetryTradesJob {
    store: Dependency<dyn RetryStore>,
    executor: Dependency<dyn TradeExecutor>,
    retry_interval: chrono::Duration,
}

impl RetryTradesJob {
    pub fn new(
        store: Option<Arc<dyn RetryStore>>,
        executor: Option<Arc<dyn TradeExecutor>>,
    ) -> Self {
        Self {
            store: Dependency::new(Capability::RetryStore, store),
            executor: Dependency::new(Capability::TradeExecutor, executor),
            retry_interval: chrono::Duration::hours(7),
        }
    }

    pub fn with_retry_interval(mut self, interval: chrono::Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn rebuild_request(retry: &PendingRetry) -> Result<TradeRequest, String> {
        TradeRequest::new(
            retry.symbol.clone(),
            retry.side,
            retry.quantity,
            retry.currency.clone(),
            retry.estimated_price,
            retry.retry_reason(),
        )
        .map_err(|e| e.to_string())
    }

    /// Process every retry due at `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RetrySweepReport, JobError> {
        let mut report = RetrySweepReport::default();

        let (store, executor) = match (self.store.require(), self.executor.require()) {
            (Ok(store), Ok(executor)) => (store, executor),
            (Err(missing), _) | (_, Err(missing)) => {
                warn!("{}, skipping retry processing", missing);
                return Ok(report);
            }
        };

        let retries = store.get_due_retries(now).await.map_err(|e| {
            error!("Failed to get pending retries: {}", e);
            e
        })?;

        report.due = retries.len();
        if retries.is_empty() {
            debug!("No pending retries to process");
            return Ok(report);
        }
        info!("Found {} pending retries to process", retries.len());

        for retry in &retries {
            info!(
                "Processing retry {} for {} {} {} (attempt {}/{})",
                retry.id,
                retry.side,
                retry.quantity,
                retry.symbol,
                retry.next_attempt_number(),
                retry.max_attempts
            );

            let outcome = match Self::rebuild_request(retry) {
                Ok(request) => {
                    let result = executor.execute_retry(&request).await;
                    if result.is_success() {
                        Ok(())
                    } else {
                        Err(result.error.unwrap_or_else(|| result.status.to_string()))
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => match store.mark_succeeded(retry.id).await {
                    Ok(()) => {
                        info!("Retry {} for {} succeeded", retry.id, retry.symbol);
                        report.succeeded += 1;
                    }
                    Err(e) => {
                        error!("Failed to mark retry {} as succeeded: {}", retry.id, e);
                        report.errors += 1;
                    }
                },
                Err(reason) => {
                    warn!("Retry {} for {} failed: {}", retry.id, retry.symbol, reason);
                    match store
                        .increment_attempt(retry.id, now + self.retry_interval)
                        .await
                    {
                        Ok(status) if status.is_terminal() => {
                            warn!(
                                "Retry {} for {} exhausted {} attempts",
                                retry.id, retry.symbol, retry.max_attempts
                            );
                            report.failed += 1;
                        }
                        Ok(_) => report.retried += 1,
                        Err(e) => {
                            error!("Failed to increment retry attempt {}: {}", retry.id, e);
                            report.errors += 1;
                        }
                    }
                }
            }
        }

        info!(
            "Retry processing completed: {} due, {} succeeded, {} retried, {} failed, {} errors",
            report.due, report.succeeded, report.retried, report.failed, report.errors
        );
        if let Ok(json) = serde_json::to_string(&report) {
            debug!("Retry sweep report: {}", json);
        }
        Ok(report)
    }
}

#[async_trait]
impl Job for RetryTradesJob {
    fn name(&self) -> &str {
        "retry_trades"
    }

    async fn run(&self) -> Result<(), JobError> {
        self.run_at(Utc::now()).await.map(|_| ())
    }
}
