//! Execution of one recalculation unit

use super::job::{RecalcJob, RecalcMode};
use super::locks::{EntityKey, EntityLocks};
use super::queue::RecalcQueue;
use crate::calculator::compute_order_costs;
use crate::cascade::{
    CascadeBus, CascadeReport, CostOutcome, CostRefresher, PropagationContext, Refreshed,
};
use crate::core::{OrderId, ProductId, RecalcError, TenantId, DEFAULT_COST_EPSILON};
use crate::events::EventSink;
use crate::monitoring::EngineMetrics;
use crate::store::CostStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info_span, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Financial block replaced
    OrderCommitted { order: OrderId, net_revenue: Decimal },
    /// Order vanished before the unit ran
    OrderMissing(OrderId),
    Product {
        product: ProductId,
        outcome: CostOutcome,
        cascade: CascadeReport,
        /// Order units enqueued for the product itself (apply_to_all)
        orders_enqueued: usize,
    },
}

/// Runs [`RecalcJob`]s against the current graph
///
/// Follow-up work goes to the queue passed into [`Recalculator::execute`],
/// so the same recalculator can serve a worker pool or a synchronous test
/// queue.
pub struct Recalculator {
    store: Arc<dyn CostStore>,
    locks: Arc<EntityLocks>,
    refresher: Arc<CostRefresher>,
    bus: CascadeBus,
    metrics: Option<Arc<EngineMetrics>>,
}

impl Recalculator {
    pub fn new(store: Arc<dyn CostStore>, events: Arc<dyn EventSink>) -> Self {
        Self::with_epsilon(store, events, DEFAULT_COST_EPSILON)
    }

    pub fn with_epsilon(
        store: Arc<dyn CostStore>,
        events: Arc<dyn EventSink>,
        epsilon: Decimal,
    ) -> Self {
        let locks = Arc::new(EntityLocks::new());
        let refresher = Arc::new(CostRefresher::new(store.clone(), locks.clone(), epsilon));
        let bus = CascadeBus::new(store.clone(), refresher.clone(), events);
        Self {
            store,
            locks,
            refresher,
            bus,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.bus = self.bus.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn CostStore> {
        &self.store
    }

    pub fn epsilon(&self) -> Decimal {
        self.refresher.epsilon()
    }

    pub fn metrics(&self) -> Option<&Arc<EngineMetrics>> {
        self.metrics.as_ref()
    }

    /// Run one unit; an `Err` means nothing of the failed step was committed
    /// and the unit may be redelivered
    pub fn execute(&self, job: RecalcJob, queue: &dyn RecalcQueue) -> Result<UnitOutcome, RecalcError> {
        let start = Instant::now();
        let result = match job.mode {
            RecalcMode::Order => self.recalc_order(job.tenant_id, OrderId::new(job.target_id)),
            RecalcMode::Product => self.recalc_product(
                job.tenant_id,
                ProductId::new(job.target_id),
                job.apply_to_all,
                queue,
            ),
        };

        if let Some(metrics) = &self.metrics {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics.record_unit(job.mode.as_str(), outcome, start.elapsed());
        }
        result
    }

    fn recalc_order(&self, tenant: TenantId, order_id: OrderId) -> Result<UnitOutcome, RecalcError> {
        let store = self.store.as_ref();

        self.locks.with_lock(EntityKey::Order(tenant, order_id), || -> Result<UnitOutcome, RecalcError> {
            let Some(order) = store.order(tenant, order_id)? else {
                warn!(%tenant, order = %order_id, "Order not found, skipping recalculation");
                return Ok(UnitOutcome::OrderMissing(order_id));
            };

            let breakdown = compute_order_costs(store, tenant, &order)?;
            let financials = breakdown
                .to_financials(SystemTime::now())
                .map_err(|source| RecalcError::Serialization {
                    order: order_id,
                    source,
                })?;
            let net_revenue = financials.net_revenue;
            store.commit_order_financials(tenant, order_id, financials)?;

            debug!(%tenant, order = %order_id, %net_revenue, "Order financials committed");
            Ok(UnitOutcome::OrderCommitted {
                order: order_id,
                net_revenue,
            })
        })
    }

    fn recalc_product(
        &self,
        tenant: TenantId,
        product: ProductId,
        apply_to_all: bool,
        queue: &dyn RecalcQueue,
    ) -> Result<UnitOutcome, RecalcError> {
        let mut ctx = PropagationContext::new(tenant);
        let span = info_span!("recalc_product", %tenant, %product, chain = ctx.chain_id());
        let _enter = span.enter();

        ctx.visit(product);
        let refreshed = self.refresher.refresh(&ctx, product)?;

        let (cascade, orders_enqueued) = match self.follow_up(&mut ctx, refreshed, apply_to_all, queue) {
            Ok(done) => done,
            Err(e) => {
                if let Some(change) = refreshed.change() {
                    self.refresher.roll_back(&ctx, &[change]);
                }
                return Err(e);
            }
        };

        debug!(
            outcome = ?refreshed.outcome,
            dependents_changed = cascade.changed.len(),
            orders_enqueued = orders_enqueued + cascade.orders_enqueued,
            "Product unit finished"
        );

        Ok(UnitOutcome::Product {
            product,
            outcome: refreshed.outcome,
            cascade,
            orders_enqueued,
        })
    }

    /// Everything after the root's own refresh; an `Err` leaves the root
    /// write for the caller to revert
    fn follow_up(
        &self,
        ctx: &mut PropagationContext,
        refreshed: Refreshed,
        apply_to_all: bool,
        queue: &dyn RecalcQueue,
    ) -> Result<(CascadeReport, usize), RecalcError> {
        let product = refreshed.product;
        if refreshed.outcome == CostOutcome::Missing {
            return Ok((CascadeReport::default(), 0));
        }

        let mut orders_enqueued = 0;
        if apply_to_all {
            for order in self.store.open_orders_referencing_product(ctx.tenant(), product)? {
                queue
                    .enqueue(RecalcJob::order(ctx.tenant(), order))
                    .map_err(|source| RecalcError::Enqueue { product, source })?;
                orders_enqueued += 1;
            }
        }

        let cascade = match refreshed.outcome {
            CostOutcome::Changed(change) if refreshed.is_ingredient => {
                self.bus.publish(ctx, change, queue)?
            }
            CostOutcome::Changed(change) => {
                self.bus.announce(change);
                CascadeReport::default()
            }
            // An unchanged root may be a redelivery whose cascade failed
            // midway, so dependents are still walked
            _ if refreshed.is_ingredient => self.bus.propagate_from(ctx, product, queue)?,
            _ => CascadeReport::default(),
        };

        Ok((cascade, orders_enqueued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DispatchError, MappingType, StoreError};
    use crate::dispatch::queue::RecordingQueue;
    use crate::events::CollectingSink;
    use crate::graph::CostSource;
    use crate::store::InMemoryStore;
    use crate::testing::{find_order, GraphBuilder};
    use rust_decimal_macros::dec;

    fn recalculator(store: &Arc<InMemoryStore>) -> (Recalculator, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        (Recalculator::new(store.clone(), sink.clone()), sink)
    }

    #[test]
    fn test_order_unit_commits_financials() {
        let mut g = GraphBuilder::new(1);
        let burger = g.product(1, dec!(8));
        let order = g.order(10, dec!(30));
        let item = g.item(order, "X-Burger", dec!(1), dec!(30));
        g.mapping(item, burger, dec!(1), MappingType::Main);
        let (store, tenant) = g.build();
        let store = Arc::new(store);
        let (recalc, _) = recalculator(&store);

        let outcome = recalc
            .execute(RecalcJob::order(tenant, order), &RecordingQueue::new())
            .unwrap();

        assert_eq!(
            outcome,
            UnitOutcome::OrderCommitted {
                order,
                net_revenue: dec!(22)
            }
        );
        let saved = find_order(&store, tenant, order);
        assert_eq!(saved.financials.total_costs, dec!(8));
        assert!(saved.financials.costs_calculated_at.is_some());
        assert!(saved.financials.calculated_costs.is_some());
    }

    #[test]
    fn test_failed_commit_leaves_previous_financials() {
        let mut g = GraphBuilder::new(1);
        let order = g.order(10, dec!(30));
        let (store, tenant) = g.build();
        store.fail_next_writes(1);
        let store = Arc::new(store);
        let (recalc, _) = recalculator(&store);

        let err = recalc
            .execute(RecalcJob::order(tenant, order), &RecordingQueue::new())
            .unwrap_err();

        assert!(matches!(err, RecalcError::Store(StoreError::Unavailable { .. })));
        let saved = find_order(&store, tenant, order);
        assert!(saved.financials.costs_calculated_at.is_none());
    }

    #[test]
    fn test_missing_order_is_not_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let (recalc, _) = recalculator(&store);
        let outcome = recalc
            .execute(RecalcJob::order(TenantId::new(1), OrderId::new(5)), &RecordingQueue::new())
            .unwrap();
        assert_eq!(outcome, UnitOutcome::OrderMissing(OrderId::new(5)));
    }

    #[test]
    fn test_product_unit_applies_to_all_orders() {
        let mut g = GraphBuilder::new(1);
        let cheese = g.ingredient(1, dec!(40));
        let pizza = g.product(2, dec!(10));
        g.component(pizza, CostSource::Ingredient(cheese), dec!(0.3));
        let o1 = g.order(10, dec!(50));
        let i1 = g.item(o1, "Pizza", dec!(1), dec!(50));
        g.mapping(i1, pizza, dec!(1), MappingType::Main);
        let o2 = g.order(11, dec!(50));
        g.legacy_item(o2, "Pizza", dec!(1), dec!(50), pizza);
        let (store, tenant) = g.build();
        let store = Arc::new(store);
        let (recalc, sink) = recalculator(&store);
        let queue = RecordingQueue::new();

        let outcome = recalc
            .execute(RecalcJob::product(tenant, pizza, true), &queue)
            .unwrap();

        match outcome {
            UnitOutcome::Product {
                outcome: CostOutcome::Changed(change),
                orders_enqueued,
                ..
            } => {
                assert_eq!(change.new_cost, dec!(12));
                assert_eq!(orders_enqueued, 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(sink.cost_changes().len(), 1);
        assert_eq!(
            queue.jobs(),
            vec![RecalcJob::order(tenant, o1), RecalcJob::order(tenant, o2)]
        );
    }

    #[test]
    fn test_authoritative_ingredient_product_refreshes_dependents() {
        let mut g = GraphBuilder::new(1);
        let sauce = g.product(1, dec!(3));
        let pizza = g.product(2, dec!(2));
        g.component(pizza, CostSource::Product(sauce), dec!(1));
        let (store, tenant) = g.build();
        let store = Arc::new(store);
        let (recalc, _) = recalculator(&store);

        recalc
            .execute(RecalcJob::product(tenant, sauce, false), &RecordingQueue::new())
            .unwrap();

        assert_eq!(store.product(tenant, pizza).unwrap().unwrap().unit_cost, dec!(3));
    }

    /// X -> P -> Q, with one order holding Q
    fn chain_store() -> (Arc<InMemoryStore>, TenantId, ProductId, ProductId, OrderId) {
        let mut g = GraphBuilder::new(1);
        let x = g.ingredient(1, dec!(2.50));
        let p = g.product(1, dec!(4.00));
        let q = g.product(2, dec!(4.00));
        g.component(p, CostSource::Ingredient(x), dec!(2));
        g.component(q, CostSource::Product(p), dec!(1));
        let order = g.order(10, dec!(30));
        let item = g.item(order, "Q", dec!(1), dec!(30));
        g.mapping(item, q, dec!(1), MappingType::Main);
        let (store, tenant) = g.build();
        (Arc::new(store), tenant, p, q, order)
    }

    #[test]
    fn test_failed_dependent_save_is_finished_by_redelivery() {
        let (store, tenant, p, q, order) = chain_store();
        store.fail_product_saves(tenant, q, 1);
        let (recalc, sink) = recalculator(&store);
        let queue = RecordingQueue::new();
        let cost = |id| store.product(tenant, id).unwrap().unwrap().unit_cost;

        let err = recalc
            .execute(RecalcJob::product(tenant, p, true), &queue)
            .unwrap_err();
        assert!(matches!(err, RecalcError::Store(StoreError::Unavailable { .. })));
        assert_eq!(cost(p), dec!(4.00));
        assert_eq!(cost(q), dec!(4.00));
        assert!(sink.cost_changes().is_empty());

        recalc
            .execute(RecalcJob::product(tenant, p, true), &queue)
            .unwrap();
        assert_eq!(cost(p), dec!(5.00));
        assert_eq!(cost(q), dec!(5.00));
        assert_eq!(sink.cost_changes().len(), 2);
        assert!(queue.jobs().contains(&RecalcJob::order(tenant, order)));
    }

    #[test]
    fn test_unchanged_root_still_refreshes_stale_dependents() {
        let (store, tenant, p, q, order) = chain_store();
        // root already saved by an earlier attempt whose cascade never finished
        store.save_product_cost(tenant, p, dec!(5.00)).unwrap();
        let (recalc, _) = recalculator(&store);
        let queue = RecordingQueue::new();

        let outcome = recalc
            .execute(RecalcJob::product(tenant, p, false), &queue)
            .unwrap();

        match outcome {
            UnitOutcome::Product {
                outcome: CostOutcome::Unchanged(cost),
                cascade,
                ..
            } => {
                assert_eq!(cost, dec!(5.00));
                assert_eq!(cascade.changed.len(), 1);
                assert_eq!(cascade.orders_enqueued, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.product(tenant, q).unwrap().unwrap().unit_cost, dec!(5.00));
        assert_eq!(queue.jobs(), vec![RecalcJob::order(tenant, order)]);
    }

    #[test]
    fn test_closed_orders_are_not_enqueued() {
        let mut g = GraphBuilder::new(1);
        let pizza = g.product(2, dec!(10));
        let open = g.order(10, dec!(50));
        g.legacy_item(open, "Pizza", dec!(1), dec!(50), pizza);
        let closed = g.order(11, dec!(50));
        g.legacy_item(closed, "Pizza", dec!(1), dec!(50), pizza);
        g.set_status(closed, crate::core::OrderStatus::Concluded);
        let (store, tenant) = g.build();
        let store = Arc::new(store);
        let (recalc, _) = recalculator(&store);
        let queue = RecordingQueue::new();

        recalc
            .execute(RecalcJob::product(tenant, pizza, true), &queue)
            .unwrap();
        assert_eq!(queue.jobs(), vec![RecalcJob::order(tenant, open)]);
    }

    #[test]
    fn test_closed_queue_fails_the_unit() {
        let mut g = GraphBuilder::new(1);
        let pizza = g.product(2, dec!(10));
        let order = g.order(10, dec!(50));
        g.legacy_item(order, "Pizza", dec!(1), dec!(50), pizza);
        let (store, tenant) = g.build();
        let store = Arc::new(store);
        let (recalc, _) = recalculator(&store);
        let queue = RecordingQueue::new();
        queue.close();

        let err = recalc
            .execute(RecalcJob::product(tenant, pizza, true), &queue)
            .unwrap_err();
        assert!(matches!(
            err,
            RecalcError::Enqueue {
                source: DispatchError::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_metrics_count_units() {
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let recalc = Recalculator::new(store, Arc::new(CollectingSink::new())).with_metrics(metrics.clone());

        recalc
            .execute(RecalcJob::order(TenantId::new(1), OrderId::new(1)), &RecordingQueue::new())
            .unwrap();
        assert_eq!(metrics.units_total.with_label_values(&["order", "ok"]).get(), 1);
    }
}
