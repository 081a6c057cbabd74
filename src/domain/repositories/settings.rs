use async_trait::async_trait;

use crate::domain::errors::RepositoryError;

/// Numeric settings owned by another part of the system
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<f64>, RepositoryError>;
}

/// Read `key`, falling back to `default` when the source is absent, has no
/// value, or fails.
pub async fn read_setting(source: Option<&dyn SettingsSource>, key: &str, default: f64) -> f64 {
    let Some(source) = source else {
        return default;
    };
    match source.get_setting(key).await {
        Ok(Some(value)) if value.is_finite() => value,
        Ok(Some(value)) => {
            tracing::warn!("Setting {} has non-finite value {}, using default {}", key, value, default);
            default
        }
        Ok(None) => default,
        Err(e) => {
            tracing::warn!("Failed to read setting {}: {}, using default {}", key, e, default);
            default
        }
    }
}
