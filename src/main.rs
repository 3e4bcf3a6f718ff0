// EsoxSolutions.EntityPool
// Reusable gameplay entities with lifespans and type fallback

// Small frame-driven demo: a volley of bolts, one of which hits something
// and is released, the rest expire on their own.

use esox_entitypool::{FrameScheduler, PoolConfiguration, PoolManager, Poolable, TypeKey};
use std::sync::Arc;
use std::time::Duration;

struct Projectile {
    damage: u32,
}

impl Poolable for Projectile {
    fn default_lifespan(&self) -> Option<Duration> {
        Some(Duration::from_millis(750))
    }
}

fn main() {
    println!("=== EsoxSolutions.EntityPool v1.0.0 ===");
    println!();

    let scheduler = Arc::new(FrameScheduler::new());
    let config = PoolConfiguration::new()
        .with_initial_capacity(4)
        .with_growth(2)
        .with_subtype("FireBolt", "Bolt")
        .with_warmup_types(["Bolt", "FireBolt"])
        .with_factory(|key: &TypeKey| {
            let damage = if key.as_str() == "FireBolt" { 12 } else { 5 };
            Some(Projectile { damage })
        });
    let pool = PoolManager::new(config, scheduler.clone());
    let bolt = TypeKey::new("Bolt");

    println!("Volley:");
    let volley: Vec<_> = (0..10).filter_map(|_| pool.acquire(&bolt)).collect();
    for shot in &volley {
        if let Some(entity) = shot.get() {
            println!("  {} {} dmg={}", entity.kind(), entity.id(), entity.payload().damage);
        }
    }
    println!("  Bolt capacity after volley: {}", pool.capacity(&bolt));

    println!();
    println!("Hit:");
    if let Some(first) = volley.first() {
        pool.release(first);
        pool.release(first);
        println!("  {} released twice, still one release counted", first.id());
    }

    let frame = Duration::from_millis(250);
    for tick in 1..=4 {
        let fired = scheduler.advance(frame);
        println!("  frame {tick}: {fired} expired, {} in use", pool.get_metrics().active_entities);
    }

    println!();
    let health = pool.get_health_status();
    println!("Healthy: {}", health.is_healthy());
    let mut metrics: Vec<_> = pool.export_metrics().into_iter().collect();
    metrics.sort();
    for (name, value) in metrics {
        println!("  {name}: {value}");
    }
}
