//! Runtime-tunable numeric settings

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::models::SettingRecord;
use super::{query_failed, DbPool};
use crate::domain::errors::RepositoryError;
use crate::domain::repositories::settings::SettingsSource;

pub struct SqliteSettingsRepository {
    pool: DbPool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite a setting
    pub async fn set(&self, key: &str, value: f64) -> Result<(), RepositoryError> {
        if !value.is_finite() {
            return Err(RepositoryError::QueryFailed(format!(
                "refusing to store non-finite value for {}",
                key
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("Failed to store setting", e))?;

        info!("Setting {} = {}", key, value);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<SettingRecord>, RepositoryError> {
        sqlx::query_as::<_, SettingRecord>("SELECT * FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to list settings", e))
    }
}

#[async_trait]
impl SettingsSource for SqliteSettingsRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<f64>, RepositoryError> {
        let row: Option<(f64,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("Failed to read setting", e))?;
        Ok(row.map(|(value,)| value))
    }
}
