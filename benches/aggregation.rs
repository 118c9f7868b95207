//! Aggregation benchmark: flow table → feature vector at typical batch sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nids_agent::features::{FeatureAggregator, FlowSchema};
use nids_agent::flows::{FlowTable, FlowValue};

const COLUMNS: [&str; 5] = ["Flow ID", "Flow IAT Max", "Fwd IAT Mean", "Bwd IAT Std", "Idle Std"];

fn make_table(flows: usize) -> FlowTable {
    let rows = (0..flows)
        .map(|i| {
            let x = i as f64;
            vec![
                FlowValue::Text(format!("10.0.0.{}-10.0.0.1-{}-443-6", i % 250, 1024 + i)),
                FlowValue::Number(x * 13.0 % 997.0),
                FlowValue::Number(x.sqrt() * 100.0),
                FlowValue::Number((x * 7.0) % 311.0),
                if i % 17 == 0 {
                    FlowValue::Missing
                } else {
                    FlowValue::Number(x % 53.0)
                },
            ]
        })
        .collect();
    FlowTable::new(COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}

fn bench_default_schema(c: &mut Criterion) {
    let aggregator = FeatureAggregator::new(FlowSchema::default());
    let mut group = c.benchmark_group("aggregate_default_schema");
    for flows in [100usize, 1_000, 10_000] {
        let table = make_table(flows);
        group.bench_with_input(BenchmarkId::from_parameter(flows), &table, |b, t| {
            b.iter(|| black_box(aggregator.aggregate(black_box(t))))
        });
    }
    group.finish();
}

fn bench_moments_schema(c: &mut Criterion) {
    let aggregator = FeatureAggregator::new(FlowSchema::moments(COLUMNS[1..].iter().copied()));
    let table = make_table(1_000);
    c.bench_function("aggregate_moments_1000_flows", |b| {
        b.iter(|| black_box(aggregator.aggregate(black_box(&table))))
    });
}

criterion_group!(benches, bench_default_schema, bench_moments_schema);
criterion_main!(benches);
