//! Performance benchmarks for dispatch_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_core::batching::{BatchBuilder, BatchConfig};
use dispatch_core::dispatch::{DispatchConfig, DispatchCoordinator};
use dispatch_core::geo::GeoPoint;
use dispatch_core::test_helpers::{scattered_orders, test_unit};

fn demo_fleet(count: usize) -> Vec<dispatch_core::model::MobileFulfillmentUnit> {
    (0..count)
        .map(|i| {
            let lat = 40.60 + (i as f64) * 0.3 / count.max(1) as f64;
            test_unit(&format!("mfu-{i}"), GeoPoint::new(lat, -74.0), 20)
        })
        .collect()
}

fn bench_dispatch_cycle(c: &mut Criterion) {
    let scenarios = vec![("small", 50, 5), ("medium", 200, 20), ("large", 1000, 80)];

    let mut group = c.benchmark_group("dispatch_cycle");
    for (name, orders, units) in scenarios {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(orders, units),
            |b, &(orders, units)| {
                let order_book = scattered_orders(orders, 42);
                let fleet = demo_fleet(units);
                let coordinator = DispatchCoordinator::new(DispatchConfig::default());
                b.iter(|| {
                    black_box(
                        coordinator
                            .dispatch(order_book.clone(), fleet.clone())
                            .expect("dispatch"),
                    );
                });
            },
        );
    }
    group.finish();
}

fn bench_batch_builder(c: &mut Criterion) {
    let builder = BatchBuilder::new(BatchConfig::default());
    let order_book = scattered_orders(500, 7);

    c.bench_function("batch_builder_500_orders", |b| {
        b.iter(|| {
            black_box(builder.build(order_book.clone()));
        });
    });
}

criterion_group!(benches, bench_dispatch_cycle, bench_batch_builder);
criterion_main!(benches);
