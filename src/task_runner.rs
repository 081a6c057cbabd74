/// Periodic task runner with failure backoff
///
/// Runs a job on a fixed interval. A failed run is retried with exponential
/// backoff (capped at the interval) and the consecutive failure count is
/// logged, so a broken job is loud without taking the process down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::jobs::Job;

#[derive(Debug, Clone)]
pub struct PeriodicTaskConfig {
    /// Delay between successful runs
    pub interval: Duration,
    /// First delay after a failure
    pub initial_retry_delay: Duration,
    /// Failures in a row before each failure is logged as an outage
    pub alert_after_failures: u32,
}

impl PeriodicTaskConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            initial_retry_delay: Duration::from_secs(60).min(interval),
            alert_after_failures: 3,
        }
    }
}

#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    /// Returns the delay to wait before the next attempt
    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        self.consecutive_failures += 1;
        let delay = self.current_retry_delay;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run `task_fn` forever: every `config.interval` while it succeeds, with
/// growing delays while it fails.
pub async fn run_with_backoff<F, Fut>(task_name: &str, config: PeriodicTaskConfig, mut task_fn: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = BackoffState::new(config.initial_retry_delay);

    loop {
        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
                sleep(config.interval).await;
            }
            Err(e) => {
                let delay = state.record_failure(config.interval);
                if state.consecutive_failures >= config.alert_after_failures {
                    error!(
                        "Task '{}' has failed {} times in a row: {}",
                        task_name, state.consecutive_failures, e
                    );
                } else {
                    warn!(
                        "Task '{}' failed (attempt {}): {}",
                        task_name, state.consecutive_failures, e
                    );
                }
                warn!("Task '{}' will retry in {:?}", task_name, delay);
                sleep(delay).await;
            }
        }
    }
}

/// Spawn `job` on the runtime with `run_with_backoff`
pub fn run_periodic(job: Arc<dyn Job>, config: PeriodicTaskConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = job.name().to_string();
        info!("Starting periodic task '{}' every {:?}", name, config.interval);
        run_with_backoff(&name, config, || {
            let job = job.clone();
            async move { job.run().await.map_err(|e| e.to_string()) }
        })
        .await;
    })
}
