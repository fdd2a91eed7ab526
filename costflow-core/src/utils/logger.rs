use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over `log_level` when set. Fails if a subscriber is
/// already installed.
pub fn init_logger(log_level: &str, json_logs: bool) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .try_init()?;
    }
    Ok(())
}

/// Initialize logging from the `[logging]` section
pub fn init_from_config(logging: &crate::config::LoggingSection) -> anyhow::Result<()> {
    init_logger(&logging.level, logging.json)
}
