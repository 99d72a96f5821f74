use bounded_pool::{join_handles, Config as PoolConfig, JoinOrdering, WorkerPool};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: Spawn overhead
fn bench_spawn_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_overhead");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        // async задачи
        group.bench_with_input(BenchmarkId::new("async", size), &size, |b, &size| {
            let rt = create_runtime();
            let pool = rt.block_on(async { WorkerPool::with_config(PoolConfig::default()).unwrap() });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let handles: Vec<_> = (0..size)
                        .map(|i| pool.spawn(async move { black_box(i) }).unwrap())
                        .collect();

                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                }
            });

            rt.block_on(pool.shutdown());
        });

        // блокирующие замыкания
        group.bench_with_input(BenchmarkId::new("blocking", size), &size, |b, &size| {
            let rt = create_runtime();
            let pool = rt.block_on(async { WorkerPool::with_config(PoolConfig::cpu_bound().max_pending(None)).unwrap() });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let handles: Vec<_> = (0..size)
                        .map(|i| pool.spawn_blocking(move || black_box(i)).unwrap())
                        .collect();
                    black_box(join_handles(handles, JoinOrdering::UnOrdered).await);
                }
            });

            rt.block_on(pool.shutdown());
        });
    }

    group.finish();
}

// Benchmark 2: Ordered vs unordered join
fn bench_join_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_ordering");
    let size = 5000;
    group.throughput(Throughput::Elements(size as u64));

    for (label, ordering) in [("ordered", JoinOrdering::Ordered), ("unordered", JoinOrdering::UnOrdered)] {
        group.bench_function(label, |b| {
            let rt = create_runtime();
            let pool = rt.block_on(async { WorkerPool::with_config(PoolConfig::io_bound()).unwrap() });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let handles: Vec<_> = (0..size)
                        .map(|i: u64| pool.spawn(async move { i.wrapping_mul(31) }).unwrap())
                        .collect();
                    black_box(join_handles(handles, ordering).await);
                }
            });

            rt.block_on(pool.shutdown());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spawn_overhead, bench_join_ordering);
criterion_main!(benches);
