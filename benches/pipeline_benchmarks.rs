use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tributary::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_basic_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("basic_pipeline");
    let rt = runtime();

    for size in [100u64, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size));

        group.bench_with_input(BenchmarkId::new("passthrough", size), size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let scope = Scope::new();
                    let pipeline = Pipeline::new(&scope);
                    black_box(collect(pipeline.run(from_iter(&scope, 0..size))).await);
                })
            });
        });

        group.bench_with_input(BenchmarkId::new("map_filter", size), size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let scope = Scope::new();
                    let pipeline = Pipeline::builder(&scope)
                        .stage(map(|x: u64| black_box(x * 2)))
                        .stage(filter(|x: &u64| x % 3 != 0))
                        .build();
                    black_box(collect(pipeline.run(from_iter(&scope, 0..size))).await);
                })
            });
        });
    }

    group.finish();
}

fn bench_pool_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_workers");
    let rt = runtime();
    group.throughput(Throughput::Elements(10000));

    for workers in [1, 2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("square", workers),
            workers,
            |b, &workers| {
                b.iter(|| {
                    rt.block_on(async {
                        let scope = Scope::new();
                        let pool = Pool::new(workers, |_scope, x: u64| async move {
                            Ok(black_box(x * x))
                        });
                        black_box(collect(pool.run(&scope, from_iter(&scope, 0..10000))).await);
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_fan_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_strategies");
    let rt = runtime();
    let work = |_scope: Scope, x: u64| async move { Ok(black_box(x + 1)) };

    group.bench_function("fan_out", |b| {
        b.iter(|| {
            rt.block_on(async {
                let scope = Scope::new();
                let output = fan_out(&scope, from_iter(&scope, 0..5000), 4, work);
                black_box(collect(output).await);
            })
        });
    });

    group.bench_function("fan_out_fan_in", |b| {
        b.iter(|| {
            rt.block_on(async {
                let scope = Scope::new();
                let output = fan_out_fan_in(&scope, from_iter(&scope, 0..5000), 4, work);
                black_box(collect(output).await);
            })
        });
    });

    group.bench_function("round_robin", |b| {
        b.iter(|| {
            rt.block_on(async {
                let scope = Scope::new();
                let output = round_robin(&scope, from_iter(&scope, 0..5000), 4, work);
                black_box(collect(output).await);
            })
        });
    });

    group.finish();
}

fn bench_batch_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_processing");
    let rt = runtime();

    for batch_size in [1, 10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("batch_unbatch", batch_size),
            batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    rt.block_on(async {
                        let scope = Scope::new();
                        let rebatch = batch(batch_size).then(unbatch());
                        let output = rebatch.apply(&scope, from_iter(&scope, 0..10000u64));
                        black_box(collect(output).await);
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_map_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_concurrent");
    let rt = runtime();

    for concurrency in [1, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("increment", concurrency),
            concurrency,
            |b, &concurrency| {
                b.iter(|| {
                    rt.block_on(async {
                        let scope = Scope::new();
                        let items: Vec<u64> = (0..2000).collect();
                        let results = map_concurrent(&scope, items, concurrency, |_scope, x| async move {
                            Ok(black_box(x + 1))
                        })
                        .await
                        .unwrap();
                        black_box(results);
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_basic_pipeline,
    bench_pool_workers,
    bench_fan_strategies,
    bench_batch_processing,
    bench_map_concurrent
);
criterion_main!(benches);
