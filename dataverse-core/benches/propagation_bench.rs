//! Benchmarks for change propagation.
//!
//! Run with: cargo bench -p dataverse-core

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dataverse_core::{Derivation, Reaction, Runtime, Source};
use std::hint::black_box;

/// A source followed by `depth` chained maps.
fn make_chain(runtime: &Runtime, depth: usize) -> (Source<u64>, Derivation<u64>) {
    let source = runtime.source(0u64);
    let mut tip = source.map(|v| v + 1);
    for _ in 1..depth {
        tip = tip.map(|v| v + 1);
    }
    (source, tip)
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain");

    for depth in [10, 50, 100] {
        group.bench_with_input(BenchmarkId::new("cold_read", depth), &depth, |b, &depth| {
            let runtime = Runtime::new();
            let (source, tip) = make_chain(&runtime, depth);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n).unwrap();
                black_box(tip.get().unwrap())
            })
        });

        group.bench_with_input(BenchmarkId::new("hot_write_read", depth), &depth, |b, &depth| {
            let runtime = Runtime::new();
            let (source, tip) = make_chain(&runtime, depth);
            let _hot = tip.tap(|| {}).unwrap().into_guard();
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n).unwrap();
                black_box(tip.get().unwrap())
            })
        });

        group.bench_with_input(BenchmarkId::new("hot_cached_read", depth), &depth, |b, &depth| {
            let runtime = Runtime::new();
            let (_source, tip) = make_chain(&runtime, depth);
            let _hot = tip.tap(|| {}).unwrap().into_guard();
            b.iter(|| black_box(tip.get().unwrap()))
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/fan_out");

    for width in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("reactions", width), &width, |b, &width| {
            let runtime = Runtime::new();
            let source = runtime.source(0u64);
            let reactions: Vec<Reaction> = (0..width as u64)
                .map(|i| {
                    let derived = source.map(move |v| v * i);
                    Reaction::new(&derived, |v| {
                        black_box(v);
                    })
                    .unwrap()
                })
                .collect();
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n).unwrap();
            });
            drop(reactions);
        });
    }

    group.finish();
}

fn bench_array_splice(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/array");

    for len in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("set_middle_hot_sum", len), &len, |b, &len| {
            let runtime = Runtime::new();
            let array = runtime.array((0..len as u64).collect::<Vec<_>>());
            let sum = array
                .as_derived()
                .map(|t, x| Ok(t.get(x)? * 2))
                .reduce(0u64, |acc, v, _| Ok(acc + v));
            let _hot = sum.tap(|| {}).unwrap().into_guard();
            let mut n = 0;
            b.iter(|| {
                n += 1;
                array.set(len / 2, n).unwrap();
                black_box(sum.get().unwrap())
            })
        });

        group.bench_with_input(BenchmarkId::new("push_pop", len), &len, |b, &len| {
            let runtime = Runtime::new();
            let array = runtime.array((0..len as u64).collect::<Vec<_>>());
            let derived = array.as_derived();
            let _hot = derived.length().tap(|| {}).unwrap().into_guard();
            b.iter(|| {
                array.push(black_box(7)).unwrap();
                black_box(array.remove(len).unwrap())
            })
        });

        group.bench_with_input(BenchmarkId::new("replace_all", len), &len, |b, &len| {
            let runtime = Runtime::new();
            let array = runtime.array((0..len as u64).collect::<Vec<_>>());
            let mut next: Vec<u64> = (0..len as u64).collect();
            b.iter(|| {
                next[len / 3] += 1;
                black_box(array.replace_all(next.clone()).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_array_splice);

criterion_main!(benches);
