//! Persistence Layer
//!
//! SQLite storage for the retry queue, runtime settings and the trade log.
//! Uses sqlx with async operations.
//!
//! # Database Schema
//!
//! ## pending_retries
//! - id: INTEGER primary key
//! - symbol, side ("BUY" / "SELL"), quantity, estimated_price, currency
//! - reason: Why the order was originally placed
//! - failure_reason: Broker error that queued it
//! - attempt_count / max_attempts
//! - status: "pending", "succeeded" or "failed"
//! - next_retry_at, created_at, updated_at: Timestamps
//!
//! ## settings
//! - key: TEXT primary key
//! - value: REAL
//! - updated_at: Timestamp
//!
//! ## trades
//! - id: INTEGER primary key
//! - symbol, side, quantity, price, currency
//! - broker_order_id, reason
//! - status: "submitted", "filled" or "cancelled"
//! - executed_at, updated_at: Timestamps

pub mod models;
pub mod retry_repository;
pub mod settings_repository;
pub mod trade_repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::domain::errors::RepositoryError;

pub use retry_repository::SqliteRetryStore;
pub use settings_repository::SqliteSettingsRepository;
pub use trade_repository::SqliteTradeRepository;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Map a query failure onto the domain error, keeping the context
pub(crate) fn query_failed(context: &str, e: sqlx::Error) -> RepositoryError {
    tracing::error!("{}: {}", context, e);
    RepositoryError::QueryFailed(format!("{}: {}", context, e))
}

/// Initialize the database connection pool with default settings
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(&DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    })
    .await
}

/// Initialize the database connection pool and create the schema
///
/// # Errors
/// Returns error if the connection fails or a table cannot be created
pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Trace
    };
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .log_statements(level);

    // Every connection to ":memory:" opens its own empty database, so the
    // pool keeps exactly one connection alive for its whole lifetime
    let pool_options = if is_memory_url(&config.url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_retries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL')),
            quantity REAL NOT NULL,
            estimated_price REAL NOT NULL,
            currency TEXT NOT NULL,
            reason TEXT NOT NULL,
            failure_reason TEXT NOT NULL,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            status TEXT NOT NULL CHECK(status IN ('pending', 'succeeded', 'failed')),
            next_retry_at DATETIME NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create pending_retries table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value REAL NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create settings table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL')),
            quantity REAL NOT NULL,
            price REAL NOT NULL,
            currency TEXT NOT NULL,
            broker_order_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('submitted', 'filled', 'cancelled')),
            executed_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_pending_retries_due ON pending_retries(status, next_retry_at)",
        "CREATE INDEX IF NOT EXISTS idx_trades_symbol_status ON trades(symbol, status)",
        "CREATE INDEX IF NOT EXISTS idx_trades_executed_at ON trades(executed_at)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/sentinel.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log statements at debug level instead of trace
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/sentinel.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}
