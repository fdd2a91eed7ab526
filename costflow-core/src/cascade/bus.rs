//! In-process cascade of product cost changes
//!
//! ```text
//! ProductCostChanged(P)
//!   -> collect every product downstream of P (through is_ingredient products)
//!   -> refresh them in topological order, each once per chain
//!   -> enqueue order units for the ones that changed
//!   -> outbound sink: P, then every dependent change
//! ```
//!
//! Inputs are always refreshed before their consumers, so diamonds of any
//! depth see final costs. Products stuck on a recipe cycle are refreshed in
//! discovery order and the edge closing the cycle is skipped with a warning.
//!
//! Nothing is announced until the cascade has committed. When a save or an
//! enqueue fails, every cost the cascade wrote is reverted before the error
//! is returned, so a redelivered unit starts from the same state.

use super::guard::PropagationContext;
use super::refresh::CostRefresher;
use crate::core::{OrderId, ProductId, RecalcError, TenantId};
use crate::dispatch::job::RecalcJob;
use crate::dispatch::queue::RecalcQueue;
use crate::events::{DomainEvent, EventSink, ProductCostChanged};
use crate::graph::CostSource;
use crate::monitoring::EngineMetrics;
use crate::store::CostStore;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info_span, warn};

/// What one cascade did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    /// Dependents recomputed (changed or not)
    pub refreshed: usize,
    /// Cost changes persisted by the cascade, in processing order
    pub changed: Vec<ProductCostChanged>,
    /// Recipe edges skipped because they lead back to a product the chain
    /// already refreshed
    pub cycles_skipped: usize,
    pub orders_enqueued: usize,
}

/// Products downstream of a root and the recipe edges between them
struct Downstream {
    /// Discovery order, breadth-first from the root
    order: Vec<ProductId>,
    consumers: HashMap<ProductId, Vec<ProductId>>,
    pending_inputs: HashMap<ProductId, usize>,
}

pub struct CascadeBus {
    store: Arc<dyn CostStore>,
    refresher: Arc<CostRefresher>,
    events: Arc<dyn EventSink>,
    metrics: Option<Arc<EngineMetrics>>,
}

impl CascadeBus {
    pub fn new(
        store: Arc<dyn CostStore>,
        refresher: Arc<CostRefresher>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            refresher,
            events,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Announce a change without cascading it
    pub fn announce(&self, change: ProductCostChanged) {
        if let Some(metrics) = &self.metrics {
            metrics.cost_changes_total.inc();
        }
        self.events.publish(DomainEvent::ProductCostChanged(change));
    }

    /// Refresh everything downstream of `change`'s product, then announce it
    /// followed by the dependent changes
    pub fn publish(
        &self,
        ctx: &mut PropagationContext,
        change: ProductCostChanged,
        queue: &dyn RecalcQueue,
    ) -> Result<CascadeReport, RecalcError> {
        let report = self.cascade(ctx, change.product_id, queue)?;
        self.announce(change);
        report.changed.iter().for_each(|c| self.announce(*c));
        Ok(report)
    }

    /// Refresh the dependents of `product` when no change event exists for it
    ///
    /// Used when a product's own unit_cost is authoritative and was edited
    /// directly, and when a redelivered unit finds its root already saved.
    pub fn propagate_from(
        &self,
        ctx: &mut PropagationContext,
        product: ProductId,
        queue: &dyn RecalcQueue,
    ) -> Result<CascadeReport, RecalcError> {
        let report = self.cascade(ctx, product, queue)?;
        report.changed.iter().for_each(|c| self.announce(*c));
        Ok(report)
    }

    fn cascade(
        &self,
        ctx: &mut PropagationContext,
        root: ProductId,
        queue: &dyn RecalcQueue,
    ) -> Result<CascadeReport, RecalcError> {
        let tenant = ctx.tenant();
        let span = info_span!("cascade", %tenant, %root, chain = ctx.chain_id());
        let _enter = span.enter();

        ctx.visit(root);
        let mut report = CascadeReport::default();
        let result = self
            .refresh_downstream(ctx, root, &mut report)
            .and_then(|()| self.enqueue_orders(tenant, &mut report, queue));

        if let Err(e) = result {
            warn!(
                changed = report.changed.len(),
                "Cascade failed, reverting its cost writes: {}", e
            );
            self.refresher.roll_back(ctx, &report.changed);
            return Err(e);
        }

        debug!(
            refreshed = report.refreshed,
            changed = report.changed.len(),
            cycles_skipped = report.cycles_skipped,
            orders = report.orders_enqueued,
            "Cascade drained"
        );
        Ok(report)
    }

    /// Kahn's algorithm over the downstream graph; a stalled walk means a
    /// cycle and resumes from the earliest-discovered unvisited product
    fn refresh_downstream(
        &self,
        ctx: &mut PropagationContext,
        root: ProductId,
        report: &mut CascadeReport,
    ) -> Result<(), RecalcError> {
        let tenant = ctx.tenant();
        let Downstream {
            order,
            consumers,
            mut pending_inputs,
        } = self.collect_downstream(tenant, root)?;

        let mut ready: VecDeque<ProductId> = order
            .iter()
            .copied()
            .filter(|p| pending_inputs.get(p).copied().unwrap_or(0) == 0)
            .collect();

        loop {
            let next = match ready.pop_front() {
                Some(product) => product,
                None => match order.iter().copied().find(|p| !ctx.contains(*p)) {
                    Some(product) => {
                        warn!(
                            %tenant,
                            %product,
                            "Circular dependency detected, refreshing from partially updated inputs"
                        );
                        product
                    }
                    None => break,
                },
            };
            ctx.visit(next);

            let refreshed = self.refresher.refresh(ctx, next)?;
            report.refreshed += 1;
            if let Some(change) = refreshed.change() {
                report.changed.push(change);
            }

            for &consumer in consumers.get(&next).map(Vec::as_slice).unwrap_or_default() {
                if ctx.contains(consumer) {
                    warn!(
                        %tenant,
                        product = %consumer,
                        via = %next,
                        "Circular dependency detected, product already processed in this chain"
                    );
                    report.cycles_skipped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.cycle_skips_total.inc();
                    }
                    continue;
                }
                if let Some(pending) = pending_inputs.get_mut(&consumer) {
                    *pending = pending.saturating_sub(1);
                    if *pending == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }
        Ok(())
    }

    /// Breadth-first over "used-in" edges, expanding only products flagged
    /// as ingredients; self-references are ignored
    fn collect_downstream(&self, tenant: TenantId, root: ProductId) -> Result<Downstream, RecalcError> {
        let mut order = Vec::new();
        let mut consumers = HashMap::new();
        let mut seen = HashSet::from([root]);
        let mut frontier = VecDeque::from([root]);

        while let Some(product) = frontier.pop_front() {
            let users: Vec<ProductId> = self
                .store
                .products_using(tenant, CostSource::Product(product))?
                .into_iter()
                .filter(|user| *user != product)
                .collect();

            for &user in &users {
                if !seen.insert(user) {
                    continue;
                }
                order.push(user);
                let feeds_others = self
                    .store
                    .product(tenant, user)?
                    .is_some_and(|row| row.is_ingredient);
                if feeds_others {
                    frontier.push_back(user);
                }
            }
            consumers.insert(product, users);
        }

        // Edges leaving the root are already satisfied
        let mut pending_inputs: HashMap<ProductId, usize> = HashMap::new();
        for (product, users) in &consumers {
            if *product == root {
                continue;
            }
            for user in users {
                if *user != root {
                    *pending_inputs.entry(*user).or_default() += 1;
                }
            }
        }

        Ok(Downstream {
            order,
            consumers,
            pending_inputs,
        })
    }

    fn enqueue_orders(
        &self,
        tenant: TenantId,
        report: &mut CascadeReport,
        queue: &dyn RecalcQueue,
    ) -> Result<(), RecalcError> {
        // An order holding several changed products gets one unit
        let mut orders: BTreeMap<OrderId, ProductId> = BTreeMap::new();
        for change in &report.changed {
            for order in self.store.open_orders_referencing_product(tenant, change.product_id)? {
                orders.entry(order).or_insert(change.product_id);
            }
        }

        for (order, product) in orders {
            queue
                .enqueue(RecalcJob::order(tenant, order))
                .map_err(|source| RecalcError::Enqueue { product, source })?;
            report.orders_enqueued += 1;
        }
        Ok(())
    }
}
