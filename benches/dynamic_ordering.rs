//! Benchmarks for sort key resolution and in-memory ordering.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sift::prelude::*;
use sift::apply_order;

#[derive(Debug, Clone, Entity)]
struct Account {
    id: i64,
    name: String,
    tier: Option<i32>,
}

fn accounts(count: usize) -> Vec<Account> {
    // Deterministic shuffle so sorting has work to do.
    (0..count)
        .map(|i| {
            let n = (i * 7919) % count;
            Account {
                id: n as i64,
                name: format!("account_{}", n % 97),
                tier: if n % 11 == 0 { None } else { Some((n % 4) as i32) },
            }
        })
        .collect()
}

fn single_key() -> SortSpec {
    SortSpec::new().then(SortKey::asc("Id"))
}

fn three_keys() -> SortSpec {
    SortSpec::new()
        .then(SortKey::desc("Tier").nulls(NullsOrder::First))
        .then(SortKey::asc("Name"))
        .then(SortKey::asc("Id"))
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_resolution");
    let builder = OrderBuilder::new();

    group.bench_function("single_key", |b| {
        let spec = single_key();
        b.iter(|| black_box(builder.resolve::<Account>(&spec).unwrap()))
    });
    group.bench_function("three_keys", |b| {
        let spec = three_keys();
        b.iter(|| black_box(builder.resolve::<Account>(&spec).unwrap()))
    });

    group.finish();
}

fn bench_sorting(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorting");

    for size in [100, 10_000] {
        let rows = accounts(size);
        group.throughput(Throughput::Elements(size as u64));

        for (label, spec) in [("single_key", single_key()), ("three_keys", three_keys())] {
            group.bench_with_input(BenchmarkId::new(label, size), &rows, |b, rows| {
                b.iter(|| {
                    let source = apply_order(MemorySource::new(rows.clone()), &spec).unwrap();
                    black_box(source.into_vec())
                })
            });
        }
    }

    group.finish();
}

fn bench_request_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_plan");
    let config = EngineConfig::default();
    let request = QueryRequest::new()
        .filter(FilterSpec::new("Name", TypeFamily::String, FilterOperator::StartsWith).with_value("account_1"))
        .sort(three_keys())
        .skip(10)
        .take(25);

    group.bench_function("from_request", |b| {
        b.iter(|| black_box(QueryPlan::<Account>::from_request(&request, &config).unwrap()))
    });

    let rows = accounts(10_000);
    let plan = QueryPlan::<Account>::from_request(&request, &config).unwrap();
    group.bench_function("apply_10000", |b| {
        b.iter(|| black_box(plan.apply(MemorySource::new(rows.clone())).unwrap().into_vec()))
    });

    group.finish();
}

criterion_group!(benches, bench_resolution, bench_sorting, bench_request_plan);
criterion_main!(benches);
