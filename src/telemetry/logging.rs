use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::GeneralConfig;
use crate::error::Error;

/// Initialize the logging system
pub fn init_logging(config: &GeneralConfig) -> Result<(), Error> {
    // Parse log level
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG directives take precedence over the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let registry = Registry::default().with(filter);
    let result = if config.structured_logging {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };

    result.map_err(|e| Error::Internal(format!("Failed to set global default subscriber: {}", e)))
}

/// Create a test logging subscriber
#[cfg(test)]
pub fn init_test_logging() {
    let filter = EnvFilter::from_default_env().add_directive(Level::DEBUG.into());

    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_test_writer().with_target(true).with_ansi(false))
        .try_init();
}
