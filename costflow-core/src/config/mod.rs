//! Engine configuration
//!
//! Loaded from a TOML file, with `COSTFLOW__SECTION__KEY` environment
//! variables taking precedence. Every key has a default, so an empty file
//! is a valid configuration.

pub mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::{Config as ConfigLoader, Environment, File};
use rust_decimal::Decimal;
use std::path::Path;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl EngineConfig {
    /// Load configuration from file with optional environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();

        let config = ConfigLoader::builder()
            .add_source(File::from(config_path))
            // Override with environment variables (COSTFLOW__)
            .add_source(
                Environment::with_prefix("COSTFLOW")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {}", config_path.display()))?;

        let cfg: EngineConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Load from default location (./config/costflow.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("config/costflow.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.engine.epsilon < Decimal::ZERO {
            anyhow::bail!("epsilon must not be negative, got {}", self.engine.epsilon);
        }

        if self.engine.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        if self.engine.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }

        if self.backoff.multiplier < 1.0 {
            anyhow::bail!("backoff multiplier must be >= 1.0");
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter_factor) {
            anyhow::bail!("jitter_factor must be between 0.0 and 1.0");
        }

        if self.backoff.initial_delay_ms > self.backoff.max_delay_ms {
            anyhow::bail!("initial_delay_ms cannot exceed max_delay_ms");
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}', must be one of: {:?}",
                self.logging.level,
                VALID_LOG_LEVELS
            );
        }

        Ok(())
    }
}
