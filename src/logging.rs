//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_LOG_FILTER: &str = "sentinel=info";

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns false when a subscriber was already installed, which happens
/// when several tests or an embedding binary initialise logging first.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
