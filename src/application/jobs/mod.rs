//! Scheduled jobs
//!
//! A job is one unit of periodic work. `task_runner::run_periodic` drives it.

pub mod retry_trades;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::errors::RepositoryError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Job failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), JobError>;
}
