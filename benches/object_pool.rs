use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sim_core::buffer::BufferPool;
use sim_core::pool::{ObjectPool, PoolOptions};

fn benchmark_acquire_release(c: &mut Criterion) {
    let pool = ObjectPool::new(
        PoolOptions {
            name: "bench".into(),
            initial_capacity: 64,
            max_capacity: 64,
            auto_expand: false,
            ..Default::default()
        },
        || vec![0u8; 256],
    );

    c.bench_function("pool_acquire_release", |bench| {
        bench.iter(|| {
            let item = pool.acquire().unwrap();
            pool.release(black_box(item)).unwrap();
        })
    });
}

fn benchmark_acquire_release_no_metrics(c: &mut Criterion) {
    let pool = ObjectPool::new(
        PoolOptions {
            name: "bench-quiet".into(),
            initial_capacity: 64,
            max_capacity: 64,
            auto_expand: false,
            enable_metrics: false,
            ..Default::default()
        },
        || vec![0u8; 256],
    );

    c.bench_function("pool_acquire_release_no_metrics", |bench| {
        bench.iter(|| {
            let item = pool.acquire().unwrap();
            pool.release(black_box(item)).unwrap();
        })
    });
}

fn benchmark_buffer_pool_cycle(c: &mut Criterion) {
    let pool = BufferPool::new(8, 16);

    c.bench_function("buffer_pool_allocate_release_1k", |bench| {
        bench.iter(|| {
            let slab = pool.allocate(black_box(1024)).unwrap();
            pool.release(slab);
        })
    });
}

criterion_group!(
    benches,
    benchmark_acquire_release,
    benchmark_acquire_release_no_metrics,
    benchmark_buffer_pool_cycle
);
criterion_main!(benches);
