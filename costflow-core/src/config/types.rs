use crate::core::DEFAULT_COST_EPSILON;
use crate::dispatch::PoolConfig;
use crate::resilience::BackoffConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub backoff: BackoffSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub events: EventsSection,
}

/// Recalculation engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Minimum absolute unit-cost change that is persisted and propagated
    #[serde(default = "default_epsilon")]
    pub epsilon: Decimal,

    /// Worker threads executing recalculation units
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deliveries per unit before it is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Warn when this many units are queued or running
    #[serde(default = "default_queue_warning_depth")]
    pub queue_warning_depth: usize,
}

/// Redelivery backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// 0.0 to 1.0
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsSection {
    /// Append every domain event to this JSONL file
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.engine.workers,
            max_attempts: self.engine.max_attempts,
            backoff: self.backoff.to_backoff(),
            queue_warning_depth: self.engine.queue_warning_depth,
            ..PoolConfig::default()
        }
    }
}

impl BackoffSection {
    pub fn to_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            queue_warning_depth: default_queue_warning_depth(),
        }
    }
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_epsilon() -> Decimal {
    DEFAULT_COST_EPSILON
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_queue_warning_depth() -> usize {
    10_000
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}
