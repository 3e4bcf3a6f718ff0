use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use esox_entitypool::{FrameScheduler, PoolConfiguration, PoolManager, Poolable, TypeKey};
use std::sync::Arc;
use std::time::Duration;

struct Bolt;

impl Poolable for Bolt {}

struct TimedBolt;

impl Poolable for TimedBolt {
    fn default_lifespan(&self) -> Option<Duration> {
        Some(Duration::from_secs(2))
    }
}

fn pool<T: Poolable>(capacity: usize, factory: fn() -> T) -> PoolManager<T> {
    let config = PoolConfiguration::new()
        .with_initial_capacity(capacity)
        .without_growth()
        .with_warmup_types(["Bolt"])
        .with_factory(move |_| Some(factory()));
    PoolManager::new(config, Arc::new(FrameScheduler::new()))
}

fn acquire_release(c: &mut Criterion) {
    let bolt = TypeKey::new("Bolt");
    let mut group = c.benchmark_group("acquire_release");

    for capacity in [16, 256, 4096] {
        let pool = pool(capacity, || Bolt);
        group.bench_with_input(BenchmarkId::new("plain", capacity), &capacity, |b, _| {
            b.iter(|| {
                let entity = pool.acquire(black_box(&bolt));
                if let Some(entity) = entity {
                    pool.release(&entity);
                }
            })
        });
    }

    let timed = pool(256, || TimedBolt);
    group.bench_function("with_lifespan", |b| {
        b.iter(|| {
            if let Some(entity) = timed.acquire(black_box(&bolt)) {
                timed.release(&entity);
            }
        })
    });

    group.finish();
}

fn fallback(c: &mut Criterion) {
    let config = PoolConfiguration::new()
        .with_initial_capacity(64)
        .without_growth()
        .with_subtype("FireBolt", "Bolt")
        .with_warmup_types(["Bolt", "FireBolt"])
        .with_factory(|_| Some(Bolt));
    let pool = PoolManager::new(config, Arc::new(FrameScheduler::new()));
    let bolt = TypeKey::new("Bolt");
    let held: Vec<_> = (0..64).filter_map(|_| pool.acquire(&bolt)).collect();

    c.bench_function("acquire_compatible", |b| {
        b.iter(|| {
            if let Some(entity) = pool.acquire(black_box(&bolt)) {
                pool.release(&entity);
            }
        })
    });

    drop(held);
}

criterion_group!(benches, acquire_release, fallback);
criterion_main!(benches);
