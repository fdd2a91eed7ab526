//! Calculator Benchmarks
//!
//! Product CMV over recipes of growing size, order recompute for orders
//! with many mapped lines, and a full cascade through a product chain.

use costflow_core::calculator::{compute_order_costs, compute_product_cost};
use costflow_core::core::{MappingType, PizzaSize};
use costflow_core::dispatch::{RecalcJob, RecalcQueue, Recalculator, RecordingQueue};
use costflow_core::events::CollectingSink;
use costflow_core::graph::CostSource;
use costflow_core::testing::{find_order, GraphBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn bench_product_cost(c: &mut Criterion) {
    let mut group = c.benchmark_group("product_cost");

    for components in [4u64, 16, 64] {
        let mut g = GraphBuilder::new(1);
        let product = g.product(1, Decimal::ZERO);
        for i in 1..=components {
            let ingredient = g.ingredient(i, Decimal::new(i as i64 * 137, 2));
            g.component(product, CostSource::Ingredient(ingredient), dec!(0.125));
        }
        let (store, tenant) = g.build();

        group.bench_with_input(BenchmarkId::from_parameter(components), &components, |b, _| {
            b.iter(|| black_box(compute_product_cost(&store, tenant, black_box(product)).unwrap()));
        });
    }
    group.finish();
}

fn bench_order_costs(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_costs");

    for lines in [1u64, 10, 50] {
        let mut g = GraphBuilder::new(1);
        let order = g.order(1, dec!(1000));
        for i in 1..=lines {
            let flavor_a = g.product(i * 2, dec!(30));
            let flavor_b = g.product(i * 2 + 1, dec!(36));
            g.size_cost(flavor_a, PizzaSize::Grande, dec!(28));
            let item = g.item(order, "Pizza Grande meio a meio", dec!(1), dec!(60));
            g.mapping(item, flavor_a, dec!(1), MappingType::Option);
            g.mapping(item, flavor_b, dec!(1), MappingType::Option);
        }
        let (store, tenant) = g.build();
        let row = find_order(&store, tenant, order);

        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, _| {
            b.iter(|| black_box(compute_order_costs(&store, tenant, black_box(&row)).unwrap()));
        });
    }
    group.finish();
}

fn bench_cascade_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade_chain");
    group.sample_size(50);

    for depth in [2u64, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || {
                    // ingredient -> p1 -> p2 -> ... -> p_depth, fresh cached costs
                    let mut g = GraphBuilder::new(1);
                    let flour = g.ingredient(1, dec!(5));
                    let first = g.product(1, Decimal::ZERO);
                    g.component(first, CostSource::Ingredient(flour), dec!(1));
                    let mut previous = first;
                    for i in 2..=depth {
                        let next = g.product(i, Decimal::ZERO);
                        g.component(next, CostSource::Product(previous), dec!(1));
                        previous = next;
                    }
                    let (store, tenant) = g.build();
                    (Arc::new(store), tenant, first)
                },
                |(store, tenant, first)| {
                    let recalculator = Recalculator::new(store, Arc::new(CollectingSink::new()));
                    let queue = RecordingQueue::new();
                    queue.enqueue(RecalcJob::product(tenant, first, true)).unwrap();
                    black_box(queue.run_until_empty(&recalculator).unwrap())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_product_cost, bench_order_costs, bench_cascade_chain);
criterion_main!(benches);
