//! Wires store, recalculator, worker pool and change detector together
//!
//! ```ignore
//! let engine = CostEngine::start(&config, store, events)?;
//! engine.detector().on_ingredient_updated(&after, &Ingredient::diff(&before, &after))?;
//! engine.wait_idle(Duration::from_secs(5));
//! engine.shutdown();
//! ```

use crate::config::EngineConfig;
use crate::core::DispatchError;
use crate::detector::ChangeDetector;
use crate::dispatch::{DeadLetter, RecalcJob, RecalcQueue, Recalculator, WorkerPool};
use crate::events::EventSink;
use crate::monitoring::EngineMetrics;
use crate::store::CostStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct CostEngine {
    store: Arc<dyn CostStore>,
    metrics: Arc<EngineMetrics>,
    detector: ChangeDetector,
    pool: WorkerPool,
}

impl CostEngine {
    pub fn start(
        config: &EngineConfig,
        store: Arc<dyn CostStore>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics =
            Arc::new(EngineMetrics::new().context("Failed to register engine metrics")?);
        let recalculator = Arc::new(
            Recalculator::with_epsilon(store.clone(), events.clone(), config.engine.epsilon)
                .with_metrics(metrics.clone()),
        );
        let pool = WorkerPool::new(recalculator, config.pool_config())?;
        let detector = ChangeDetector::new(store.clone(), Arc::new(pool.handle()), events);

        info!(
            workers = config.engine.workers,
            epsilon = %config.engine.epsilon,
            "Cost engine started"
        );

        Ok(Self {
            store,
            metrics,
            detector,
            pool,
        })
    }

    /// Entry points for persistence-layer mutation hooks
    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn store(&self) -> &Arc<dyn CostStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Enqueue a unit directly, bypassing change detection
    pub fn submit(&self, job: RecalcJob) -> Result<(), DispatchError> {
        self.pool.enqueue(job)
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Block until every enqueued unit (and its follow-ups) finished
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.pool.dead_letters()
    }

    pub fn shutdown(self) {
        self.pool.shutdown();
        info!("Cost engine stopped");
    }
}
