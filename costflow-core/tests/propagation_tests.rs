//! Propagation Integration Tests
//!
//! Run mutations through the change detector and a live worker pool and
//! check what ends up persisted:
//! - Ingredient price change cascading through two product levels into orders
//! - Diamond-shaped recipes of equal and uneven depth
//! - Recipe cycles terminating
//! - Tenant isolation
//! - Redelivery after store failures, including failures midway through a
//!   cascade

use costflow_core::core::{MappingType, ProductId};
use costflow_core::dispatch::{RecalcJob, Recalculator, RecordingQueue};
use costflow_core::events::CollectingSink;
use costflow_core::graph::{CostSource, Ingredient};
use costflow_core::testing::{find_order, GraphBuilder};
use costflow_core::{CostEngine, CostStore, EngineConfig, InMemoryStore, RecalcQueue};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.workers = 3;
    config.backoff.initial_delay_ms = 1;
    config.backoff.max_delay_ms = 5;
    config.backoff.jitter_factor = 0.0;
    config
}

fn product_cost(store: &InMemoryStore, tenant: costflow_core::TenantId, id: u64) -> rust_decimal::Decimal {
    store
        .product(tenant, ProductId::new(id))
        .unwrap()
        .unwrap()
        .unit_cost
}

// ============================================================================
// END-TO-END CASCADE
// ============================================================================

/// X 2.00 -> 2.50; P = 2·X; Q = P + Y. Orders hold P ×2 and Q ×1.
#[test]
fn test_ingredient_change_reaches_every_dependent_order() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(2.00));
    let y = g.ingredient(2, dec!(3.00));
    let p = g.product(1, dec!(4.00));
    let q = g.product(2, dec!(7.00));
    g.component(p, CostSource::Ingredient(x), dec!(2));
    g.component(q, CostSource::Product(p), dec!(1));
    g.component(q, CostSource::Ingredient(y), dec!(1));

    let o1 = g.order(10, dec!(50));
    let combo = g.item(o1, "Combo P", dec!(2), dec!(50));
    g.mapping(combo, p, dec!(1), MappingType::Main);
    let o2 = g.order(11, dec!(30));
    let single = g.item(o2, "Q", dec!(1), dec!(30));
    g.mapping(single, q, dec!(1), MappingType::Main);
    let (store, tenant) = g.build();
    let store = Arc::new(store);

    let sink = Arc::new(CollectingSink::new());
    let engine = CostEngine::start(&fast_config(), store.clone(), sink.clone()).unwrap();

    for order in [o1, o2] {
        engine
            .detector()
            .on_order_created(&find_order(&store, tenant, order))
            .unwrap();
    }
    assert!(engine.wait_idle(IDLE_TIMEOUT));
    assert_eq!(find_order(&store, tenant, o1).financials.net_revenue, dec!(42.00));
    assert_eq!(find_order(&store, tenant, o2).financials.net_revenue, dec!(23.00));
    sink.clear();

    let (before, after) = store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2.50))
        .unwrap();
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(product_cost(&store, tenant, 1), dec!(5.00));
    assert_eq!(product_cost(&store, tenant, 2), dec!(8.00));

    // net revenue drops by delta × quantity
    assert_eq!(find_order(&store, tenant, o1).financials.net_revenue, dec!(40.00));
    assert_eq!(find_order(&store, tenant, o2).financials.net_revenue, dec!(22.00));

    let changes = sink.cost_changes();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.delta() == dec!(1.00)));
    assert!(engine.dead_letters().is_empty());
    engine.shutdown();
}

// ============================================================================
// DIAMONDS
// ============================================================================

/// A = X; B = A; C = A; D = B + C. Orders hold D and B.
#[test]
fn test_diamond_join_sees_both_updated_branches() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(1));
    let a = g.product(1, dec!(1));
    let b = g.product(2, dec!(1));
    let c = g.product(3, dec!(1));
    let d = g.product(4, dec!(2));
    g.component(a, CostSource::Ingredient(x), dec!(1));
    g.component(b, CostSource::Product(a), dec!(1));
    g.component(c, CostSource::Product(a), dec!(1));
    g.component(d, CostSource::Product(b), dec!(1));
    g.component(d, CostSource::Product(c), dec!(1));

    let join_order = g.order(10, dec!(20));
    let join_item = g.item(join_order, "D", dec!(1), dec!(20));
    g.mapping(join_item, d, dec!(1), MappingType::Main);
    let branch_order = g.order(11, dec!(10));
    let branch_item = g.item(branch_order, "B", dec!(1), dec!(10));
    g.mapping(branch_item, b, dec!(1), MappingType::Main);
    let (store, tenant) = g.build();
    let store = Arc::new(store);

    let sink = Arc::new(CollectingSink::new());
    let engine = CostEngine::start(&fast_config(), store.clone(), sink.clone()).unwrap();

    let (before, after) = store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2))
        .unwrap();
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(product_cost(&store, tenant, 1), dec!(2));
    assert_eq!(product_cost(&store, tenant, 2), dec!(2));
    assert_eq!(product_cost(&store, tenant, 3), dec!(2));
    assert_eq!(product_cost(&store, tenant, 4), dec!(4));

    assert_eq!(find_order(&store, tenant, join_order).financials.net_revenue, dec!(16.00));
    assert_eq!(find_order(&store, tenant, branch_order).financials.net_revenue, dec!(8.00));
    assert_eq!(sink.cost_changes().len(), 4);
    assert_eq!(engine.metrics().cycle_skips_total.get(), 0);
    engine.shutdown();
}

/// A -> B -> D and A -> C -> E -> D. D sits two levels below A on one side
/// and three on the other.
#[test]
fn test_uneven_diamond_join_waits_for_the_longer_branch() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(1));
    let a = g.product(1, dec!(1));
    let b = g.product(2, dec!(1));
    let c = g.product(3, dec!(1));
    let e = g.product(4, dec!(1));
    let d = g.product(5, dec!(2));
    g.component(a, CostSource::Ingredient(x), dec!(1));
    g.component(b, CostSource::Product(a), dec!(1));
    g.component(c, CostSource::Product(a), dec!(1));
    g.component(e, CostSource::Product(c), dec!(1));
    g.component(d, CostSource::Product(b), dec!(1));
    g.component(d, CostSource::Product(e), dec!(1));

    let join_order = g.order(10, dec!(20));
    g.legacy_item(join_order, "D", dec!(1), dec!(20), d);
    let branch_order = g.order(11, dec!(10));
    g.legacy_item(branch_order, "E", dec!(1), dec!(10), e);
    let (store, tenant) = g.build();
    let store = Arc::new(store);
    store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2))
        .unwrap();

    let recalculator = Recalculator::new(store.clone(), Arc::new(CollectingSink::new()));
    let queue = RecordingQueue::new();
    queue.enqueue(RecalcJob::product(tenant, a, true)).unwrap();
    for job in queue.drain() {
        recalculator.execute(job, &queue).unwrap();
    }

    let costs: Vec<_> = (1..=5).map(|id| product_cost(&store, tenant, id)).collect();
    assert_eq!(costs, vec![dec!(2), dec!(2), dec!(2), dec!(2), dec!(4)]);
    assert_eq!(
        queue.jobs(),
        vec![RecalcJob::order(tenant, join_order), RecalcJob::order(tenant, branch_order)]
    );

    queue.run_until_empty(&recalculator).unwrap();
    assert_eq!(find_order(&store, tenant, join_order).financials.net_revenue, dec!(16.00));
    assert_eq!(find_order(&store, tenant, branch_order).financials.net_revenue, dec!(8.00));
}

// ============================================================================
// CYCLES
// ============================================================================

/// A = X + B, B = A. The walk from A reaches B, then stops at A.
#[test]
fn test_recipe_cycle_terminates() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(1));
    let a = g.product(1, dec!(2));
    let b = g.product(2, dec!(1));
    g.component(a, CostSource::Ingredient(x), dec!(1));
    g.component(a, CostSource::Product(b), dec!(1));
    g.component(b, CostSource::Product(a), dec!(1));
    let (store, tenant) = g.build();
    let store = Arc::new(store);

    let sink = Arc::new(CollectingSink::new());
    let engine = CostEngine::start(&fast_config(), store.clone(), sink.clone()).unwrap();

    let (before, after) = store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2))
        .unwrap();
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(product_cost(&store, tenant, 1), dec!(3));
    assert_eq!(product_cost(&store, tenant, 2), dec!(3));
    assert_eq!(engine.metrics().cycle_skips_total.get(), 1);
    assert_eq!(sink.cost_changes().len(), 2);
    engine.shutdown();
}

// ============================================================================
// TENANT ISOLATION
// ============================================================================

#[test]
fn test_units_only_touch_their_tenant() {
    let mut first = GraphBuilder::new(1);
    let x = first.ingredient(1, dec!(2));
    let p = first.product(1, dec!(4));
    first.component(p, CostSource::Ingredient(x), dec!(2));
    let (store, t1) = first.build();

    // Same ids, different tenant
    let mut second = GraphBuilder::with_store(store, 2);
    let x2 = second.ingredient(1, dec!(2));
    let p2 = second.product(1, dec!(4));
    second.component(p2, CostSource::Ingredient(x2), dec!(2));
    let (store, t2) = second.build();
    let store = Arc::new(store);

    let engine =
        CostEngine::start(&fast_config(), store.clone(), Arc::new(CollectingSink::new())).unwrap();
    store.clear_touched_tenants();

    let (before, after) = store
        .update_ingredient(t1, x, |i| i.unit_price = dec!(3))
        .unwrap();
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(store.touched_tenants(), HashSet::from([t1]));
    assert_eq!(product_cost(&store, t1, 1), dec!(6));
    assert_eq!(product_cost(&store, t2, 1), dec!(4));
    engine.shutdown();
}

// ============================================================================
// REDELIVERY
// ============================================================================

#[test]
fn test_transient_failures_are_redelivered() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(2));
    let p = g.product(1, dec!(4));
    g.component(p, CostSource::Ingredient(x), dec!(2));
    let (store, tenant) = g.build();
    let store = Arc::new(store);

    let engine =
        CostEngine::start(&fast_config(), store.clone(), Arc::new(CollectingSink::new())).unwrap();

    let (before, after) = store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2.5))
        .unwrap();
    store.fail_next_writes(2);
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(product_cost(&store, tenant, 1), dec!(5));
    assert_eq!(engine.metrics().redeliveries_total.get(), 2);
    assert!(engine.dead_letters().is_empty());
    engine.shutdown();
}

#[test]
fn test_exhausted_unit_leaves_previous_state() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(2));
    let p = g.product(1, dec!(4));
    g.component(p, CostSource::Ingredient(x), dec!(2));
    let (store, tenant) = g.build();
    let store = Arc::new(store);

    let mut config = fast_config();
    config.engine.max_attempts = 2;
    let engine = CostEngine::start(&config, store.clone(), Arc::new(CollectingSink::new())).unwrap();

    let (before, after) = store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2.5))
        .unwrap();
    store.fail_next_writes(10);
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(product_cost(&store, tenant, 1), dec!(4));
    let dead = engine.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 2);
    assert!(dead[0].error.contains("unavailable"));
    engine.shutdown();
}

/// X -> P -> Q; Q's save fails once after P was already written
#[test]
fn test_failure_midway_through_cascade_converges() {
    let mut g = GraphBuilder::new(1);
    let x = g.ingredient(1, dec!(2.00));
    let y = g.ingredient(2, dec!(3.00));
    let p = g.product(1, dec!(4.00));
    let q = g.product(2, dec!(7.00));
    g.component(p, CostSource::Ingredient(x), dec!(2));
    g.component(q, CostSource::Product(p), dec!(1));
    g.component(q, CostSource::Ingredient(y), dec!(1));

    let o1 = g.order(10, dec!(50));
    let combo = g.item(o1, "Combo P", dec!(2), dec!(50));
    g.mapping(combo, p, dec!(1), MappingType::Main);
    let o2 = g.order(11, dec!(30));
    let single = g.item(o2, "Q", dec!(1), dec!(30));
    g.mapping(single, q, dec!(1), MappingType::Main);
    let (store, tenant) = g.build();
    let store = Arc::new(store);

    let sink = Arc::new(CollectingSink::new());
    let engine = CostEngine::start(&fast_config(), store.clone(), sink.clone()).unwrap();

    let (before, after) = store
        .update_ingredient(tenant, x, |i| i.unit_price = dec!(2.50))
        .unwrap();
    store.fail_product_saves(tenant, q, 1);
    engine
        .detector()
        .on_ingredient_updated(&after, &Ingredient::diff(&before, &after))
        .unwrap();
    assert!(engine.wait_idle(IDLE_TIMEOUT));

    assert_eq!(product_cost(&store, tenant, 1), dec!(5.00));
    assert_eq!(product_cost(&store, tenant, 2), dec!(8.00));
    assert_eq!(find_order(&store, tenant, o1).financials.net_revenue, dec!(40.00));
    assert_eq!(find_order(&store, tenant, o2).financials.net_revenue, dec!(22.00));

    assert_eq!(engine.metrics().redeliveries_total.get(), 1);
    assert!(engine.dead_letters().is_empty());
    // The failed attempt announced nothing
    assert_eq!(sink.cost_changes().len(), 2);
    engine.shutdown();
}
