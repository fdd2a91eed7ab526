//! Prometheus metrics for the recalculation engine
//!
//! Covers:
//! - Recalculation units (by mode and outcome, plus latency)
//! - Cascade activity (cost changes, cycle skips)
//! - Queue health (depth, redeliveries, dead letters)

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,
    /// Units executed, labelled by mode and outcome
    pub units_total: IntCounterVec,
    /// Unit wall time in seconds, labelled by mode
    pub unit_duration_seconds: HistogramVec,
    /// Product costs that moved by at least epsilon
    pub cost_changes_total: IntCounter,
    /// Products skipped because the chain had already visited them
    pub cycle_skips_total: IntCounter,
    /// Failed units handed back to the queue
    pub redeliveries_total: IntCounter,
    /// Units abandoned after exhausting their attempts
    pub dead_letters_total: IntCounter,
    /// Units queued or running
    pub queue_depth: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let units_total = IntCounterVec::new(
            Opts::new("recalc_units_total", "Total number of recalculation units executed")
                .namespace("costflow"),
            &["mode", "outcome"],
        )?;
        registry.register(Box::new(units_total.clone()))?;

        let unit_duration_seconds = HistogramVec::new(
            HistogramOpts::new("recalc_unit_duration_seconds", "Recalculation unit wall time")
                .namespace("costflow")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["mode"],
        )?;
        registry.register(Box::new(unit_duration_seconds.clone()))?;

        let cost_changes_total = IntCounter::with_opts(
            Opts::new("cascade_cost_changes_total", "Product cost changes persisted")
                .namespace("costflow"),
        )?;
        registry.register(Box::new(cost_changes_total.clone()))?;

        let cycle_skips_total = IntCounter::with_opts(
            Opts::new(
                "cascade_cycle_skips_total",
                "Products skipped as already visited in their propagation chain",
            )
            .namespace("costflow"),
        )?;
        registry.register(Box::new(cycle_skips_total.clone()))?;

        let redeliveries_total = IntCounter::with_opts(
            Opts::new("queue_redeliveries_total", "Failed units redelivered").namespace("costflow"),
        )?;
        registry.register(Box::new(redeliveries_total.clone()))?;

        let dead_letters_total = IntCounter::with_opts(
            Opts::new("queue_dead_letters_total", "Units abandoned after max attempts")
                .namespace("costflow"),
        )?;
        registry.register(Box::new(dead_letters_total.clone()))?;

        let queue_depth = IntGauge::with_opts(
            Opts::new("queue_depth", "Recalculation units queued or running").namespace("costflow"),
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            units_total,
            unit_duration_seconds,
            cost_changes_total,
            cycle_skips_total,
            redeliveries_total,
            dead_letters_total,
            queue_depth,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_unit(&self, mode: &str, outcome: &str, elapsed: Duration) {
        self.units_total.with_label_values(&[mode, outcome]).inc();
        self.unit_duration_seconds
            .with_label_values(&[mode])
            .observe(elapsed.as_secs_f64());
    }

    /// Render every family in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
