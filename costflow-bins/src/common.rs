//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and output code.

use anyhow::{Context, Result};
use clap::Args;
use costflow_core::dispatch::DeadLetter;
use costflow_core::graph::Order;
use costflow_core::EngineConfig;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Common CLI arguments for all binaries
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Engine configuration file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,
}

impl CommonArgs {
    /// Load the configuration and apply command-line overrides
    pub fn load_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        config.validate().context("Invalid command-line overrides")?;
        Ok(config)
    }
}

/// Initialize tracing/logging
pub fn init_logging(config: &EngineConfig) -> Result<()> {
    costflow_core::utils::init_from_config(&config.logging)
}

/// One output line per order
#[derive(Debug, Serialize)]
pub struct OrderSummary<'a> {
    pub order_id: u64,
    pub external_id: &'a str,
    pub marketplace: &'a str,
    pub gross_total: rust_decimal::Decimal,
    pub total_costs: rust_decimal::Decimal,
    pub total_commissions: rust_decimal::Decimal,
    pub net_revenue: rust_decimal::Decimal,
}

impl<'a> From<&'a Order> for OrderSummary<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            order_id: order.id.get(),
            external_id: &order.external_id,
            marketplace: order.marketplace.as_str(),
            gross_total: order.gross_total,
            total_costs: order.financials.total_costs,
            total_commissions: order.financials.total_commissions,
            net_revenue: order.financials.net_revenue,
        }
    }
}

/// Write order financials as JSON lines
pub fn write_financials<W: Write>(out: &mut W, orders: &[Order]) -> Result<()> {
    for order in orders {
        serde_json::to_writer(&mut *out, &OrderSummary::from(order))?;
        writeln!(out)?;
    }
    Ok(())
}

/// Print final statistics
pub fn print_stats(applied: usize, enqueued: usize, dead_letters: &[DeadLetter]) {
    tracing::info!("=== Replay Summary ===");
    tracing::info!("Mutations applied: {}", applied);
    tracing::info!("Units enqueued by detector: {}", enqueued);

    if dead_letters.is_empty() {
        tracing::info!("Dead letters: 0");
    } else {
        tracing::warn!("Dead letters: {}", dead_letters.len());
        for letter in dead_letters {
            tracing::warn!("  {} after {} attempts: {}", letter.job, letter.attempts, letter.error);
        }
    }
}
