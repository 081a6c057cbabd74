use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::RepositoryError;
use crate::domain::repositories::settings::SettingsSource;
use crate::domain::services::currency_exchange::HUB_CURRENCY;

pub const MIN_LIQUIDITY_MULTIPLE: &str = "min_liquidity_multiple";
pub const ORDER_BOOK_DEPTH_LEVELS: &str = "order_book_depth_levels";
pub const PRICE_DISCREPANCY_THRESHOLD: &str = "price_discrepancy_threshold";
pub const ENABLE_ORDER_BOOK_ANALYSIS: &str = "enable_order_book_analysis";
pub const LIMIT_ORDER_BUFFER_PERCENT: &str = "limit_order_buffer_percent";
pub const TRANSACTION_COST_FIXED: &str = "transaction_cost_fixed";
pub const TRANSACTION_COST_PERCENT: &str = "transaction_cost_percent";

/// Every numeric setting the pipeline reads, with its default
pub const SETTING_DEFAULTS: &[(&str, f64)] = &[
    (MIN_LIQUIDITY_MULTIPLE, 2.0),
    (ORDER_BOOK_DEPTH_LEVELS, 5.0),
    (PRICE_DISCREPANCY_THRESHOLD, 0.50),
    (ENABLE_ORDER_BOOK_ANALYSIS, 1.0),
    (LIMIT_ORDER_BUFFER_PERCENT, 0.05),
    (TRANSACTION_COST_FIXED, 2.0),
    (TRANSACTION_COST_PERCENT, 0.002),
];

/// Default for `key`, or 0.0 for keys the pipeline does not know about
pub fn setting_default(key: &str) -> f64 {
    SETTING_DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or(0.0)
}

pub const DEFAULT_RETRY_INTERVAL_HOURS: u64 = 7;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: i64 = 3;
/// Currency routing only knows pairs quoted against this hub
pub const DEFAULT_HUB_CURRENCY: &str = HUB_CURRENCY;

#[derive(Debug, Clone, PartialEq)]
pub struct TradingConfig {
    pub min_liquidity_multiple: f64,
    pub order_book_depth_levels: usize,
    pub price_discrepancy_threshold: f64, // fraction, 0.50 = 50%
    pub enable_order_book_analysis: bool,
    pub limit_order_buffer_percent: f64, // fraction, 0.05 = 5%
    pub transaction_cost_fixed: f64,     // in hub currency
    pub transaction_cost_percent: f64,

    pub retry_interval_hours: u64,
    pub max_retry_attempts: i64,
    pub hub_currency: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            min_liquidity_multiple: setting_default(MIN_LIQUIDITY_MULTIPLE),
            order_book_depth_levels: setting_default(ORDER_BOOK_DEPTH_LEVELS) as usize,
            price_discrepancy_threshold: setting_default(PRICE_DISCREPANCY_THRESHOLD),
            enable_order_book_analysis: true,
            limit_order_buffer_percent: setting_default(LIMIT_ORDER_BUFFER_PERCENT),
            transaction_cost_fixed: setting_default(TRANSACTION_COST_FIXED),
            transaction_cost_percent: setting_default(TRANSACTION_COST_PERCENT),
            retry_interval_hours: DEFAULT_RETRY_INTERVAL_HOURS,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            hub_currency: DEFAULT_HUB_CURRENCY.to_string(),
        }
    }
}

/// Parse `raw` and accept it only inside `range`. Logs and returns `None`
/// otherwise so the caller keeps its default.
fn parse_ranged<T>(name: &str, raw: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => Some(value),
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} (must be between {} and {}), using default",
                name,
                value,
                range.start(),
                range.end()
            );
            None
        }
        Err(e) => {
            tracing::warn!("Failed to parse {} '{}': {}, using default", name, raw, e);
            None
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    let raw = raw.trim().to_lowercase();
    raw == "true" || raw == "1"
}

impl TradingConfig {
    /// Load `.env` (if any) and then the process environment
    pub fn load() -> TradingConfig {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> TradingConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TradingConfig {
        let mut config = TradingConfig::default();

        if let Some(raw) = lookup("MIN_LIQUIDITY_MULTIPLE") {
            if let Some(value) = parse_ranged("MIN_LIQUIDITY_MULTIPLE", &raw, 0.0..=100.0) {
                config.min_liquidity_multiple = value;
            }
        }

        if let Some(raw) = lookup("ORDER_BOOK_DEPTH_LEVELS") {
            if let Some(value) = parse_ranged("ORDER_BOOK_DEPTH_LEVELS", &raw, 1usize..=50) {
                config.order_book_depth_levels = value;
            }
        }

        if let Some(raw) = lookup("PRICE_DISCREPANCY_THRESHOLD") {
            if let Some(value) = parse_ranged("PRICE_DISCREPANCY_THRESHOLD", &raw, 0.0..=10.0) {
                config.price_discrepancy_threshold = value;
            }
        }

        if let Some(raw) = lookup("ENABLE_ORDER_BOOK_ANALYSIS") {
            config.enable_order_book_analysis = parse_flag(&raw);
        }

        if let Some(raw) = lookup("LIMIT_ORDER_BUFFER_PERCENT") {
            // Between 0% and 50%
            if let Some(value) = parse_ranged("LIMIT_ORDER_BUFFER_PERCENT", &raw, 0.0..=0.5) {
                config.limit_order_buffer_percent = value;
            }
        }

        if let Some(raw) = lookup("TRANSACTION_COST_FIXED") {
            if let Some(value) = parse_ranged("TRANSACTION_COST_FIXED", &raw, 0.0..=1000.0) {
                config.transaction_cost_fixed = value;
            }
        }

        if let Some(raw) = lookup("TRANSACTION_COST_PERCENT") {
            if let Some(value) = parse_ranged("TRANSACTION_COST_PERCENT", &raw, 0.0..=0.1) {
                config.transaction_cost_percent = value;
            }
        }

        if let Some(raw) = lookup("RETRY_INTERVAL_HOURS") {
            if let Some(value) = parse_ranged("RETRY_INTERVAL_HOURS", &raw, 1u64..=168) {
                config.retry_interval_hours = value;
            }
        }

        if let Some(raw) = lookup("MAX_RETRY_ATTEMPTS") {
            if let Some(value) = parse_ranged("MAX_RETRY_ATTEMPTS", &raw, 1i64..=10) {
                config.max_retry_attempts = value;
            }
        }

        if let Some(raw) = lookup("HUB_CURRENCY") {
            let currency = raw.trim().to_uppercase();
            if currency == HUB_CURRENCY {
                config.hub_currency = currency;
            } else if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
                tracing::warn!(
                    "Unsupported HUB_CURRENCY '{}': conversions route through {}, using default",
                    currency,
                    HUB_CURRENCY
                );
            } else {
                tracing::warn!("Invalid HUB_CURRENCY '{}', using default: {}", raw, config.hub_currency);
            }
        }

        config
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_hours * 3600)
    }

    pub fn retry_interval_chrono(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retry_interval_hours as i64)
    }

    /// Value for a setting key as the settings table would store it
    pub fn setting(&self, key: &str) -> Option<f64> {
        match key {
            MIN_LIQUIDITY_MULTIPLE => Some(self.min_liquidity_multiple),
            ORDER_BOOK_DEPTH_LEVELS => Some(self.order_book_depth_levels as f64),
            PRICE_DISCREPANCY_THRESHOLD => Some(self.price_discrepancy_threshold),
            ENABLE_ORDER_BOOK_ANALYSIS => Some(if self.enable_order_book_analysis { 1.0 } else { 0.0 }),
            LIMIT_ORDER_BUFFER_PERCENT => Some(self.limit_order_buffer_percent),
            TRANSACTION_COST_FIXED => Some(self.transaction_cost_fixed),
            TRANSACTION_COST_PERCENT => Some(self.transaction_cost_percent),
            _ => None,
        }
    }
}

#[async_trait]
impl SettingsSource for TradingConfig {
    async fn get_setting(&self, key: &str) -> Result<Option<f64>, RepositoryError> {
        Ok(self.setting(key))
    }
}
