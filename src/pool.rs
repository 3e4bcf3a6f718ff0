//! The pool manager: acquire, release and growth per type key

use crate::config::PoolConfiguration;
use crate::entity::{
    Deactivation, EntityRef, PartiallyBuiltEntity, PoolId, Poolable, PooledEntity,
};
use crate::errors::{PoolError, PoolResult};
use crate::health::{HealthStatus, PoolReport, SubPoolReport};
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::scheduler::Scheduler;
use crate::store::EntityStore;
use crate::sub_pool::SubPool;
use crate::type_key::TypeKey;

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

struct PoolShared<T> {
    id: PoolId,
    config: PoolConfiguration<T>,
    sub_pools: Mutex<BTreeMap<TypeKey, SubPool<T>>>,
    store: Arc<EntityStore<T>>,
    scheduler: Arc<dyn Scheduler>,
    metrics: MetricsTracker,
}

/// Central broker of reusable entities, one sub-pool per type key.
///
/// Cloning is cheap and yields another handle to the same pool.
///
/// The sub-pool map is locked only for bookkeeping: factories, kind hooks and
/// the scheduler always run with it released, so any of them may call
/// `release` (or `acquire`) on the same pool.
///
/// # Examples
///
/// ```
/// use esox_entitypool::{FrameScheduler, PoolConfiguration, PoolManager, Poolable, TypeKey};
/// use std::sync::Arc;
///
/// struct Bolt;
/// impl Poolable for Bolt {}
///
/// let config = PoolConfiguration::new()
///     .with_initial_capacity(2)
///     .without_growth()
///     .with_warmup_types(["Bolt"])
///     .with_factory(|_| Some(Bolt));
/// let pool = PoolManager::new(config, Arc::new(FrameScheduler::new()));
/// let bolt = TypeKey::new("Bolt");
///
/// let first = pool.acquire(&bolt).unwrap();
/// let _second = pool.acquire(&bolt).unwrap();
/// assert!(pool.acquire(&bolt).is_none());
///
/// pool.release(&first);
/// assert_eq!(pool.available_count(&bolt), 1);
/// ```
pub struct PoolManager<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for PoolManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Poolable> PoolManager<T> {
    /// Create a pool with its own entity store and warm up the configured
    /// types
    pub fn new(config: PoolConfiguration<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_store(config, scheduler, Arc::new(EntityStore::new()))
    }

    /// Create a pool whose entities live in a store shared with the game
    pub fn with_store(
        config: PoolConfiguration<T>,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<EntityStore<T>>,
    ) -> Self {
        let warmup_types = config.settings.warmup_types.clone();
        let pool = Self {
            shared: Arc::new(PoolShared {
                id: PoolId::next(),
                config,
                sub_pools: Mutex::new(BTreeMap::new()),
                store,
                scheduler,
                metrics: MetricsTracker::new(),
            }),
        };

        if !warmup_types.is_empty() {
            if let Err(error) = pool.warm_up(&warmup_types) {
                tracing::warn!(pool = %pool.id(), %error, "warm-up incomplete");
            }
        }
        pool
    }

    pub fn id(&self) -> PoolId {
        self.shared.id
    }

    pub fn config(&self) -> &PoolConfiguration<T> {
        &self.shared.config
    }

    pub fn store(&self) -> &Arc<EntityStore<T>> {
        &self.shared.store
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.shared.scheduler
    }

    /// Register a sub-pool for every type and fill it with
    /// `initial_capacity` hidden, available entities.
    ///
    /// Every type is attempted; the first failure is returned.
    pub fn warm_up(&self, types: &[TypeKey]) -> PoolResult<()> {
        let count = self.shared.config.settings.initial_capacity;
        let mut outcome = Ok(());

        for key in types {
            self.ensure_sub_pool(key);
            if let Err(error) = self.grow(key, count) {
                if outcome.is_ok() {
                    outcome = Err(error);
                }
            }
        }

        tracing::info!(
            pool = %self.id(),
            types = types.len(),
            per_type = count,
            "warm-up finished"
        );
        outcome
    }

    /// Hand out an available entity of `requested`, marking it in use.
    ///
    /// Order: exact sub-pool, then compatible sub-pools, then growth of the
    /// exact sub-pool followed by one more exact scan. `None` means the pool
    /// is exhausted; callers skip whatever they meant to spawn.
    pub fn acquire(&self, requested: &TypeKey) -> Option<EntityRef<T>> {
        let settings = &self.shared.config.settings;
        let now = self.shared.scheduler.now();

        if self.ensure_sub_pool(requested) {
            tracing::debug!(pool = %self.id(), kind = %requested, "created sub-pool on first request");
            if let Err(error) = self.grow(requested, settings.initial_capacity) {
                tracing::warn!(pool = %self.id(), kind = %requested, %error, "lazy warm-up failed");
            }
        }

        if let Some((entity, generation)) = self.scan_exact(requested, now) {
            return Some(self.finish_acquire(&entity, generation));
        }

        if let Some((entity, generation)) = self.scan_compatible(requested, now) {
            MetricsTracker::record(&self.shared.metrics.fallback_hits, 1);
            tracing::debug!(
                pool = %self.id(),
                requested = %requested,
                served = %entity.kind(),
                "served by compatible type"
            );
            return Some(self.finish_acquire(&entity, generation));
        }

        if settings.can_grow && settings.growth_increment > 0 {
            if let Err(error) = self.grow(requested, settings.growth_increment) {
                tracing::warn!(pool = %self.id(), kind = %requested, %error, "growth failed");
            }
            if let Some((entity, generation)) = self.scan_exact(requested, now) {
                return Some(self.finish_acquire(&entity, generation));
            }
        }

        MetricsTracker::record(&self.shared.metrics.exhausted_events, 1);
        tracing::debug!(pool = %self.id(), kind = %requested, "pool exhausted");
        None
    }

    /// Acquire the configured default type
    pub fn acquire_default(&self) -> Option<EntityRef<T>> {
        let key = self.shared.config.default_type()?.clone();
        self.acquire(&key)
    }

    /// Like [`acquire`](Self::acquire), with exhaustion as an error
    pub fn acquire_checked(&self, requested: &TypeKey) -> PoolResult<EntityRef<T>> {
        self.acquire(requested)
            .ok_or_else(|| PoolError::Exhausted(requested.clone()))
    }

    /// Return the use pinned by `entity` to the pool.
    ///
    /// Idempotent and safe from any depth of callback: releasing an entity
    /// that is already available, that has since been acquired by someone
    /// else, or that was destroyed does nothing.
    pub fn release(&self, entity: &EntityRef<T>) {
        match entity.get() {
            Some(target) => {
                self.release_use(&target, Some(entity.generation()));
            }
            None => {
                tracing::debug!(pool = %self.id(), entity = %entity.id(), "release of destroyed entity ignored");
            }
        }
    }

    /// Release whatever use of `entity` is current. Used by code that holds
    /// the entity itself rather than the reference it was acquired with.
    pub fn release_entity(&self, entity: &Arc<PooledEntity<T>>) {
        self.release_use(entity, None);
    }

    /// Create `count` entities of `key` regardless of the growth policy.
    /// Returns how many were added.
    pub fn grow(&self, key: &TypeKey, count: usize) -> PoolResult<usize> {
        if count == 0 {
            self.ensure_sub_pool(key);
            return Ok(0);
        }

        let factory = self
            .shared
            .config
            .factory_for(key)
            .cloned()
            .ok_or_else(|| PoolError::NoFactory(key.clone()))?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(payload) = factory(key) else {
                break;
            };
            let entity = PartiallyBuiltEntity::begin_construct(key.clone(), payload)
                .with_owning_pool(self.id())
                .finish_construct(self.id());
            created.push(self.shared.store.insert(entity));
        }

        {
            let mut sub_pools = self.shared.sub_pools.lock();
            let sub_pool = sub_pools
                .entry(key.clone())
                .or_insert_with(|| SubPool::new(key.clone()));
            for entity in &created {
                sub_pool.insert(entity);
            }
        }

        MetricsTracker::record(&self.shared.metrics.growth_events, 1);
        MetricsTracker::record(&self.shared.metrics.entities_created, created.len());
        tracing::info!(pool = %self.id(), kind = %key, added = created.len(), "sub-pool grown");

        if created.len() < count {
            tracing::warn!(pool = %self.id(), kind = %key, requested = count, created = created.len(), "factory came up short");
            return Err(PoolError::FactoryFailed {
                key: key.clone(),
                requested: count,
                created: created.len(),
            });
        }
        Ok(created.len())
    }

    /// Finish construction of an entity built outside the pool and register
    /// it, available, under its own type.
    pub fn adopt(&self, partial: PartiallyBuiltEntity<T>) -> PoolResult<Arc<PooledEntity<T>>> {
        if let Some(owner) = partial.owning_pool() {
            if owner != self.id() {
                tracing::warn!(pool = %self.id(), entity = %partial.id(), %owner, "refusing to adopt foreign entity");
                return Err(PoolError::ForeignEntity {
                    entity: partial.id(),
                    owner,
                });
            }
        }

        let entity = self.shared.store.insert(partial.finish_construct(self.id()));
        self.register(&entity);
        MetricsTracker::record(&self.shared.metrics.entities_created, 1);
        tracing::debug!(pool = %self.id(), entity = %entity.id(), kind = %entity.kind(), "entity adopted");
        Ok(entity)
    }

    /// Activate the use pinned by `entity` again.
    ///
    /// Acquisition already activates, so on the current use this is a no-op:
    /// flags stay live and a running lifespan timer is neither reset nor
    /// duplicated. Returns whether `entity` is the current use.
    pub fn activate(&self, entity: &EntityRef<T>) -> bool {
        let Some(target) = entity.get() else {
            return false;
        };
        if !entity.is_current() {
            tracing::debug!(pool = %self.id(), entity = %entity.id(), "activate on stale reference ignored");
            return false;
        }

        self.arm_expiry(&target, entity.generation(), false);
        tracing::trace!(pool = %self.id(), entity = %entity.id(), "already in use; expiry kept");
        true
    }

    /// Change the lifespan of the current use. The entity's next use starts
    /// from its kind's lifespan again.
    ///
    /// A running timer is kept unless `refresh` is set; `None` cancels it.
    pub fn set_lifespan(&self, entity: &EntityRef<T>, lifespan: Option<Duration>, refresh: bool) {
        if !entity.is_current() {
            return;
        }
        let Some(target) = entity.get() else {
            return;
        };

        target.set_lifespan(lifespan, self.shared.scheduler.as_ref());
        if lifespan.is_some() {
            self.arm_expiry(&target, entity.generation(), refresh);
        }
    }

    /// Live entities registered under `key`
    pub fn capacity(&self, key: &TypeKey) -> usize {
        self.shared
            .sub_pools
            .lock()
            .get(key)
            .map_or(0, |sub_pool| sub_pool.live().count())
    }

    pub fn available_count(&self, key: &TypeKey) -> usize {
        self.shared
            .sub_pools
            .lock()
            .get(key)
            .map_or(0, |sub_pool| sub_pool.available_count())
    }

    pub fn in_use_count(&self, key: &TypeKey) -> usize {
        self.shared
            .sub_pools
            .lock()
            .get(key)
            .map_or(0, |sub_pool| sub_pool.in_use_count())
    }

    /// Registered entries under `key`, including stale ones not yet pruned
    pub fn registered_count(&self, key: &TypeKey) -> usize {
        self.shared
            .sub_pools
            .lock()
            .get(key)
            .map_or(0, |sub_pool| sub_pool.len())
    }

    pub fn sub_pool_keys(&self) -> Vec<TypeKey> {
        self.shared.sub_pools.lock().keys().cloned().collect()
    }

    /// Per-type occupancy
    pub fn report(&self) -> PoolReport {
        let sub_pools = self.shared.sub_pools.lock();
        PoolReport {
            sub_pools: sub_pools
                .values()
                .map(|sub_pool| SubPoolReport {
                    key: sub_pool.key().clone(),
                    capacity: sub_pool.live().count(),
                    available: sub_pool.available_count(),
                    in_use: sub_pool.in_use_count(),
                })
                .collect(),
        }
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(&self.report(), self.shared.config.settings.can_grow)
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.shared.metrics.get_metrics(&self.report())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let report = self.report();
        let metrics = self.shared.metrics.get_metrics(&report);
        crate::metrics::MetricsExporter::export_prometheus(&metrics, &report, pool_name, tags)
    }

    /// Returns true if this call created the sub-pool
    fn ensure_sub_pool(&self, key: &TypeKey) -> bool {
        let mut sub_pools = self.shared.sub_pools.lock();
        if sub_pools.contains_key(key) {
            return false;
        }
        sub_pools.insert(key.clone(), SubPool::new(key.clone()));
        true
    }

    /// Put `entity` under the sub-pool of its exact type, creating the
    /// sub-pool if needed. No-op when it is already registered.
    fn register(&self, entity: &Arc<PooledEntity<T>>) -> bool {
        let mut sub_pools = self.shared.sub_pools.lock();
        sub_pools
            .entry(entity.kind().clone())
            .or_insert_with(|| SubPool::new(entity.kind().clone()))
            .insert(entity)
    }

    fn scan_exact(&self, key: &TypeKey, now: Duration) -> Option<(Arc<PooledEntity<T>>, u32)> {
        let reuse_delay = self.shared.config.settings.min_reuse_delay;
        let (pruned, claimed) = {
            let mut sub_pools = self.shared.sub_pools.lock();
            let sub_pool = sub_pools.get_mut(key)?;
            let pruned = sub_pool.prune_stale();
            (pruned, sub_pool.claim_first_available(now, reuse_delay))
        };

        self.record_pruned(key, pruned);
        claimed
    }

    fn scan_compatible(&self, requested: &TypeKey, now: Duration) -> Option<(Arc<PooledEntity<T>>, u32)> {
        let settings = &self.shared.config.settings;
        if settings.compatibility.is_empty() {
            return None;
        }

        let mut pruned = 0;
        let mut claimed = None;
        {
            let mut sub_pools = self.shared.sub_pools.lock();
            for (candidate, sub_pool) in sub_pools.iter_mut() {
                if candidate == requested || !settings.compatibility.is_compatible(candidate, requested) {
                    continue;
                }
                pruned += sub_pool.prune_stale();
                claimed = sub_pool.claim_first_available(now, settings.min_reuse_delay);
                if claimed.is_some() {
                    break;
                }
            }
        }

        self.record_pruned(requested, pruned);
        claimed
    }

    fn record_pruned(&self, key: &TypeKey, pruned: usize) {
        if pruned > 0 {
            MetricsTracker::record(&self.shared.metrics.stale_pruned, pruned);
            tracing::debug!(pool = %self.id(), kind = %key, pruned, "pruned stale entries");
        }
    }

    fn finish_acquire(&self, entity: &Arc<PooledEntity<T>>, generation: u32) -> EntityRef<T> {
        self.arm_expiry(entity, generation, false);
        entity.payload().on_activate();

        MetricsTracker::record(&self.shared.metrics.total_acquired, 1);
        tracing::debug!(
            pool = %self.id(),
            entity = %entity.id(),
            kind = %entity.kind(),
            generation,
            "entity acquired"
        );
        EntityRef::new(entity, generation)
    }

    fn arm_expiry(&self, entity: &Arc<PooledEntity<T>>, generation: u32, refresh: bool) {
        let pool = Arc::downgrade(&self.shared);
        let target = Arc::downgrade(entity);

        entity.schedule_expiry(generation, refresh, self.shared.scheduler.as_ref(), move || {
            Box::new(move || {
                if let (Some(shared), Some(entity)) = (pool.upgrade(), target.upgrade()) {
                    PoolManager { shared }.expire(&entity, generation);
                }
            })
        });
    }

    /// Lifespan timer callback
    fn expire(&self, entity: &Arc<PooledEntity<T>>, generation: u32) {
        entity.clear_fired_expiry(generation);
        tracing::debug!(pool = %self.id(), entity = %entity.id(), generation, "lifespan expired");
        if self.release_use(entity, Some(generation)) {
            MetricsTracker::record(&self.shared.metrics.expirations, 1);
        }
    }

    fn release_use(&self, entity: &Arc<PooledEntity<T>>, generation: Option<u32>) -> bool {
        if entity.owning_pool() != self.id() {
            tracing::warn!(
                pool = %self.id(),
                entity = %entity.id(),
                owner = %entity.owning_pool(),
                "release of entity owned by another pool ignored"
            );
            return false;
        }

        let now = self.shared.scheduler.now();
        match entity.deactivate(generation, now, self.shared.scheduler.as_ref()) {
            Deactivation::Released => {
                self.register(entity);
                MetricsTracker::record(&self.shared.metrics.total_released, 1);
                tracing::debug!(pool = %self.id(), entity = %entity.id(), kind = %entity.kind(), "entity released");
                true
            }
            Deactivation::AlreadyAvailable => {
                self.register(entity);
                tracing::trace!(pool = %self.id(), entity = %entity.id(), "double release absorbed");
                false
            }
            Deactivation::Stale => {
                tracing::debug!(pool = %self.id(), entity = %entity.id(), "stale reference released; ignored");
                false
            }
            Deactivation::InProgress => {
                tracing::trace!(pool = %self.id(), entity = %entity.id(), "nested release absorbed");
                false
            }
        }
    }
}

impl<T> fmt::Debug for PoolManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LifecycleState;
    use crate::scheduler::FrameScheduler;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Bolt {
        cleanups: AtomicUsize,
    }

    impl Poolable for Bolt {
        fn before_deactivate(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool_with(config: PoolConfiguration<Bolt>) -> (PoolManager<Bolt>, Arc<FrameScheduler>) {
        let scheduler = Arc::new(FrameScheduler::new());
        let config = config.with_factory(|_| Some(Bolt::default()));
        (PoolManager::new(config, scheduler.clone()), scheduler)
    }

    fn key(name: &str) -> TypeKey {
        TypeKey::new(name)
    }

    #[test]
    fn test_warm_up_creates_hidden_available_entities() {
        let (pool, _) = pool_with(
            PoolConfiguration::new()
                .with_initial_capacity(3)
                .with_warmup_types(["Bolt", "Beam"]),
        );

        assert_eq!(pool.capacity(&key("Bolt")), 3);
        assert_eq!(pool.available_count(&key("Beam")), 3);
        assert_eq!(pool.sub_pool_keys(), vec![key("Beam"), key("Bolt")]);
        assert_eq!(pool.store().len(), 6);
    }

    #[test]
    fn test_acquire_lazily_creates_sub_pool() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(4));

        assert_eq!(pool.capacity(&key("Bolt")), 0);
        let bolt = pool.acquire(&key("Bolt")).unwrap();

        assert_eq!(pool.capacity(&key("Bolt")), 4);
        assert_eq!(pool.in_use_count(&key("Bolt")), 1);
        assert!(bolt.is_current());
        assert_eq!(bolt.get().unwrap().state(), LifecycleState::InUse);
    }

    #[test]
    fn test_acquire_never_hands_out_twice() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(5).without_growth());

        let refs: Vec<_> = std::iter::from_fn(|| pool.acquire(&key("Bolt"))).collect();
        let mut ids: Vec<_> = refs.iter().map(|r| r.id()).collect();
        ids.sort();
        ids.dedup();

        assert_eq!(refs.len(), 5);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(1));
        let bolt = pool.acquire(&key("Bolt")).unwrap();
        let entity = bolt.get().unwrap();

        pool.release(&bolt);
        pool.release(&bolt);

        assert!(entity.is_available());
        assert_eq!(entity.payload().cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(pool.registered_count(&key("Bolt")), 1);
        assert_eq!(pool.get_metrics().total_released, 1);
    }

    #[test]
    fn test_stale_reference_cannot_release_new_use() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(1).without_growth());

        let first = pool.acquire(&key("Bolt")).unwrap();
        pool.release(&first);
        let second = pool.acquire(&key("Bolt")).unwrap();
        assert_eq!(first.id(), second.id());

        pool.release(&first);
        assert!(second.is_current());
        assert!(!first.is_current());
        assert!(pool.acquire(&key("Bolt")).is_none());
    }

    #[test]
    fn test_grow_ignores_growth_policy() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(1).without_growth());

        assert_eq!(pool.grow(&key("Bolt"), 3), Ok(3));
        assert_eq!(pool.capacity(&key("Bolt")), 3);
        assert_eq!(pool.grow(&key("Bolt"), 0), Ok(0));
    }

    #[test]
    fn test_grow_reports_short_factory() {
        let scheduler = Arc::new(FrameScheduler::new());
        let budget = Arc::new(AtomicUsize::new(2));
        let remaining = Arc::clone(&budget);
        let config = PoolConfiguration::new().with_factory(move |_| {
            remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .ok()
                .map(|_| Bolt::default())
        });
        let pool = PoolManager::new(config, scheduler);

        let result = pool.grow(&key("Bolt"), 5);
        assert_eq!(
            result,
            Err(PoolError::FactoryFailed {
                key: key("Bolt"),
                requested: 5,
                created: 2
            })
        );
        assert_eq!(pool.capacity(&key("Bolt")), 2);
    }

    #[test]
    fn test_grow_without_factory() {
        let pool: PoolManager<Bolt> =
            PoolManager::new(PoolConfiguration::new(), Arc::new(FrameScheduler::new()));

        assert_eq!(pool.grow(&key("Bolt"), 1), Err(PoolError::NoFactory(key("Bolt"))));
        assert!(pool.acquire(&key("Bolt")).is_none());
        assert!(matches!(
            pool.acquire_checked(&key("Bolt")),
            Err(PoolError::Exhausted(_))
        ));
    }

    #[test]
    fn test_acquire_default_uses_first_warmup_type() {
        let (pool, _) = pool_with(
            PoolConfiguration::new()
                .with_initial_capacity(1)
                .with_warmup_types(["Beam", "Bolt"]),
        );

        let default = pool.acquire_default().unwrap();
        assert_eq!(default.kind(), &key("Beam"));
    }

    #[test]
    fn test_stale_entries_pruned_on_next_scan() {
        let (pool, _) = pool_with(
            PoolConfiguration::new()
                .with_initial_capacity(2)
                .without_growth()
                .with_warmup_types(["Bolt"]),
        );
        let bolt = pool.acquire(&key("Bolt")).unwrap();
        pool.store().despawn(bolt.id());

        assert_eq!(pool.registered_count(&key("Bolt")), 2);
        pool.release(&bolt);

        assert!(pool.acquire(&key("Bolt")).is_some());
        assert_eq!(pool.registered_count(&key("Bolt")), 1);
        assert_eq!(pool.get_metrics().stale_pruned, 1);
    }

    #[test]
    fn test_adopt_registers_under_own_type() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(0).without_growth());

        let mut partial = PartiallyBuiltEntity::begin_construct("Relic", Bolt::default());
        partial.activate();
        partial.deactivate();
        assert!(pool.acquire(&key("Relic")).is_none());

        let entity = pool.adopt(partial).unwrap();
        assert!(entity.is_construction_complete());
        assert_eq!(entity.owning_pool(), pool.id());
        assert_eq!(pool.available_count(&key("Relic")), 1);
        assert_eq!(pool.acquire(&key("Relic")).unwrap().id(), entity.id());
    }

    #[test]
    fn test_adopt_rejects_foreign_entity() {
        let (pool, _) = pool_with(PoolConfiguration::new());
        let (other, _) = pool_with(PoolConfiguration::new());

        let partial = PartiallyBuiltEntity::begin_construct("Bolt", Bolt::default())
            .with_owning_pool(other.id());
        let id = partial.id();

        assert_eq!(
            pool.adopt(partial).unwrap_err(),
            PoolError::ForeignEntity {
                entity: id,
                owner: other.id()
            }
        );
    }

    #[test]
    fn test_release_into_wrong_pool_is_ignored() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(1));
        let (other, _) = pool_with(PoolConfiguration::new().with_initial_capacity(1));

        let bolt = pool.acquire(&key("Bolt")).unwrap();
        other.release(&bolt);

        assert!(bolt.is_current());
        assert_eq!(other.capacity(&key("Bolt")), 0);
    }

    #[test]
    fn test_release_from_cleanup_hook_is_absorbed() {
        struct Grenade {
            on_cleanup: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
            cleanups: AtomicUsize,
        }

        impl Poolable for Grenade {
            fn before_deactivate(&self) {
                self.cleanups.fetch_add(1, Ordering::SeqCst);
                if let Some(hook) = self.on_cleanup.lock().take() {
                    hook();
                }
            }
        }

        let config = PoolConfiguration::new()
            .with_initial_capacity(1)
            .with_factory(|_| {
                Some(Grenade {
                    on_cleanup: Mutex::new(None),
                    cleanups: AtomicUsize::new(0),
                })
            });
        let pool = PoolManager::new(config, Arc::new(FrameScheduler::new()));
        let grenade = pool.acquire(&key("Grenade")).unwrap();
        let entity = grenade.get().unwrap();

        let nested_pool = pool.clone();
        let nested_ref = grenade.clone();
        let nested_ran = Arc::new(AtomicBool::new(false));
        let ran = Arc::clone(&nested_ran);
        *entity.payload().on_cleanup.lock() = Some(Box::new(move || {
            nested_pool.release(&nested_ref);
            ran.store(true, Ordering::SeqCst);
        }));

        pool.release(&grenade);

        assert!(nested_ran.load(Ordering::SeqCst));
        assert!(entity.is_available());
        assert_eq!(entity.payload().cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(pool.registered_count(&key("Grenade")), 1);
        assert_eq!(pool.get_metrics().total_released, 1);
    }

    #[test]
    fn test_report_and_health() {
        let (pool, _) = pool_with(
            PoolConfiguration::new()
                .with_initial_capacity(2)
                .without_growth()
                .with_warmup_types(["Bolt"]),
        );
        let _a = pool.acquire(&key("Bolt")).unwrap();
        let _b = pool.acquire(&key("Bolt")).unwrap();

        let report = pool.report();
        assert_eq!(report.get(&key("Bolt")).map(|s| s.in_use), Some(2));

        let health = pool.get_health_status();
        assert!(!health.is_healthy());
        assert_eq!(health.active_entities, 2);
        assert_eq!(pool.export_metrics()["total_acquired"], "2");
    }

    #[test]
    fn test_concurrent_first_acquire_warms_once() {
        let (pool, _) = pool_with(PoolConfiguration::new().with_initial_capacity(4).without_growth());
        let barrier = std::sync::Barrier::new(4);

        let acquired: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        pool.acquire(&key("Bolt")).is_some() as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(acquired, 4);
        assert_eq!(pool.capacity(&key("Bolt")), 4);
        assert_eq!(pool.get_metrics().growth_events, 1);
    }

    #[test]
    fn test_activate_keeps_running_expiry() {
        let scheduler = Arc::new(FrameScheduler::new());
        let config = PoolConfiguration::new()
            .with_initial_capacity(1)
            .with_factory(|_| Some(Bolt::default()));
        let pool = PoolManager::new(config, scheduler.clone());

        let bolt = pool.acquire(&key("Bolt")).unwrap();
        pool.set_lifespan(&bolt, Some(Duration::from_secs(1)), true);
        scheduler.advance(Duration::from_millis(600));

        assert!(pool.activate(&bolt));
        assert!(pool.activate(&bolt));
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(bolt.get().unwrap().generation(), bolt.generation());

        scheduler.advance(Duration::from_millis(400));
        assert!(!bolt.is_current());
        assert!(!pool.activate(&bolt));
        assert_eq!(pool.get_metrics().total_acquired, 1);
    }
}
