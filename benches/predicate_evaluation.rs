//! Benchmarks for predicate construction, compilation and evaluation.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sift::prelude::*;
use sift::{PredicateCache, SqlRenderer, compile};

#[derive(Debug, Clone, Entity)]
struct Account {
    id: i64,
    name: String,
    tier: Option<i32>,
    active: bool,
}

fn accounts(count: usize) -> Vec<Account> {
    (0..count)
        .map(|i| Account {
            id: i as i64,
            name: format!("account_{}", i),
            tier: if i % 7 == 0 { None } else { Some((i % 5) as i32) },
            active: i % 3 != 0,
        })
        .collect()
}

fn simple_spec() -> Specification<Account> {
    Specification::build(|x| Ok(x.property("Id")?.gt(100))).unwrap()
}

fn composite_spec() -> Specification<Account> {
    let named = Specification::build(|x| Ok(x.property("Name")?.contains("_1"))).unwrap();
    let tiered = Specification::build(|x| Ok(x.property("Tier")?.between(2, 4))).unwrap();
    let active = Specification::build(|x| Ok(x.property("Active")?.is_true())).unwrap();
    named.or(&tiered).and(&active.not().not())
}

fn nested_spec(depth: usize) -> Specification<Account> {
    (0..depth).fold(simple_spec(), |acc, i| {
        let leaf = Specification::build(|x| Ok(x.property("Id")?.ne(i as i64))).unwrap();
        acc.and(&leaf).or(&Specification::never())
    })
}

fn bench_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("composition");

    group.bench_function("build_simple", |b| b.iter(|| black_box(simple_spec())));
    group.bench_function("build_composite", |b| b.iter(|| black_box(composite_spec())));

    for depth in [3, 10] {
        group.bench_with_input(BenchmarkId::new("nested", depth), &depth, |b, &depth| {
            b.iter(|| black_box(nested_spec(depth)))
        });
    }

    group.finish();
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");
    let spec = composite_spec();

    group.bench_function("uncached", |b| b.iter(|| black_box(compile(spec.tree()).unwrap())));

    let cache = PredicateCache::new();
    cache.compile(spec.tree()).unwrap();
    group.bench_function("cache_hit", |b| b.iter(|| black_box(cache.compile(spec.tree()).unwrap())));

    group.bench_function("render_sql", |b| {
        let renderer = SqlRenderer::postgres();
        b.iter(|| black_box(renderer.render_specification(&spec).unwrap()))
    });

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");

    for size in [100, 10_000] {
        let rows = accounts(size);
        group.throughput(Throughput::Elements(size as u64));

        let simple = simple_spec();
        group.bench_with_input(BenchmarkId::new("simple", size), &rows, |b, rows| {
            b.iter(|| black_box(simple.filter_slice(rows).unwrap().len()))
        });

        let composite = composite_spec();
        group.bench_with_input(BenchmarkId::new("composite", size), &rows, |b, rows| {
            b.iter(|| black_box(composite.filter_slice(rows).unwrap().len()))
        });

        let predicate = composite.compiled().unwrap();
        group.bench_with_input(BenchmarkId::new("compiled_call", size), &rows, |b, rows| {
            b.iter(|| black_box(rows.iter().filter(|row| predicate.call(row)).count()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_composition, bench_compilation, bench_evaluation);
criterion_main!(benches);
