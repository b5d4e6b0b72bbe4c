//! Logging bootstrap.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::InvokerError;

/// Install a global `tracing` subscriber. `RUST_LOG` overrides the configured
/// level. Fails without side effects if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), InvokerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| InvokerError::Logging(e.to_string()))?;

    let subscriber = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        subscriber
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init()
    } else if config.timestamps {
        subscriber.with(fmt::layer().with_target(true)).try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(true).without_time())
            .try_init()
    };

    result.map_err(|e| InvokerError::Logging(e.to_string()))
}
