//! Pooled entities and their lifecycle state machine

use crate::scheduler::{Scheduler, TimerCallback, TimerHandle};
use crate::type_key::TypeKey;

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an entity, stable across every reuse cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Non-owning handle naming the pool an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(u64);

impl PoolId {
    pub(crate) fn next() -> Self {
        Self(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Coarse lifecycle state. An entity is always exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LifecycleState {
    /// Hidden, non-colliding, non-ticking; safe to hand out
    Available,

    /// Visible, colliding, ticking; owned by exactly one caller
    InUse,
}

/// Presentation flags owned by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityFlags {
    pub visible: bool,
    pub collidable: bool,
    pub ticking: bool,
}

impl EntityFlags {
    pub const HIDDEN: Self = Self {
        visible: false,
        collidable: false,
        ticking: false,
    };

    pub const LIVE: Self = Self {
        visible: true,
        collidable: true,
        ticking: true,
    };
}

/// Behaviour a concrete pooled kind plugs into the generic state machine.
///
/// Hooks take `&self`: the payload is shared between the pool and the
/// current user, so kinds keep their mutable parts behind their own interior
/// mutability.
pub trait Poolable: Send + Sync + 'static {
    /// Lifespan applied every time the entity enters use. `None` or zero
    /// disables self-expiry.
    fn default_lifespan(&self) -> Option<Duration> {
        None
    }

    /// Runs after the entity became `InUse`
    fn on_activate(&self) {}

    /// Kind-specific cleanup (stop motion, clear instigator, detach from a
    /// target). Runs before the generic deactivation and the pool
    /// notification.
    fn before_deactivate(&self) {}
}

#[derive(Debug)]
struct Lifecycle {
    state: LifecycleState,
    flags: EntityFlags,
    generation: u32,
    releasing: bool,
    /// Lifespan every new use starts from
    base_lifespan: Option<Duration>,
    /// Lifespan of the current use
    lifespan: Option<Duration>,
    expiry: Option<TimerHandle>,
    last_released_at: Option<Duration>,
}

/// First phase of two-phase construction.
///
/// A partially built entity can be configured and even toggled locally, but
/// it has no path to a pool: it cannot be acquired and it cannot announce
/// itself as available. [`PoolManager::adopt`](crate::PoolManager::adopt)
/// finishes construction and registers it.
pub struct PartiallyBuiltEntity<T> {
    id: EntityId,
    kind: TypeKey,
    payload: T,
    owning_pool: Option<PoolId>,
    lifespan: Option<Duration>,
    state: LifecycleState,
    flags: EntityFlags,
}

impl<T: Poolable> PartiallyBuiltEntity<T> {
    pub fn begin_construct(kind: impl Into<TypeKey>, payload: T) -> Self {
        let lifespan = payload.default_lifespan();
        Self {
            id: EntityId::next(),
            kind: kind.into(),
            payload,
            owning_pool: None,
            lifespan,
            state: LifecycleState::Available,
            flags: EntityFlags::HIDDEN,
        }
    }

    pub fn with_owning_pool(mut self, pool: PoolId) -> Self {
        self.owning_pool = Some(pool);
        self
    }

    pub fn with_lifespan(mut self, lifespan: Option<Duration>) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> &TypeKey {
        &self.kind
    }

    pub fn owning_pool(&self) -> Option<PoolId> {
        self.owning_pool
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn flags(&self) -> EntityFlags {
        self.flags
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    pub fn is_construction_complete(&self) -> bool {
        false
    }

    /// Local toggle only; no timers are armed before construction completes
    pub fn activate(&mut self) {
        if self.state == LifecycleState::InUse {
            return;
        }
        self.state = LifecycleState::InUse;
        self.flags = EntityFlags::LIVE;
        self.payload.on_activate();
    }

    /// Local toggle only; nobody is notified
    pub fn deactivate(&mut self) {
        if self.state == LifecycleState::Available {
            return;
        }
        self.payload.before_deactivate();
        self.state = LifecycleState::Available;
        self.flags = EntityFlags::HIDDEN;
    }

    /// Second phase: bind to `owner` and come out hidden and available.
    pub(crate) fn finish_construct(mut self, owner: PoolId) -> PooledEntity<T> {
        self.deactivate();
        PooledEntity {
            id: self.id,
            kind: self.kind,
            owning_pool: owner,
            payload: self.payload,
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Available,
                flags: EntityFlags::HIDDEN,
                generation: 0,
                releasing: false,
                base_lifespan: self.lifespan,
                lifespan: self.lifespan,
                expiry: None,
                last_released_at: None,
            }),
        }
    }
}

impl<T> fmt::Debug for PartiallyBuiltEntity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartiallyBuiltEntity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("owning_pool", &self.owning_pool)
            .field("state", &self.state)
            .finish()
    }
}

/// Outcome of a release attempt on the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deactivation {
    /// Entity went back to `Available`; the owning pool must be told
    Released,
    AlreadyAvailable,
    /// The reference predates the entity's current use
    Stale,
    /// A release of this same use is already running further up the stack
    InProgress,
}

/// A fully constructed, reusable entity.
///
/// Owned by an [`EntityStore`](crate::EntityStore); the pool and callers hold
/// weak references. All state changes go through the transition methods
/// below.
pub struct PooledEntity<T> {
    id: EntityId,
    kind: TypeKey,
    owning_pool: PoolId,
    payload: T,
    lifecycle: Mutex<Lifecycle>,
}

impl<T: Poolable> PooledEntity<T> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> &TypeKey {
        &self.kind
    }

    pub fn owning_pool(&self) -> PoolId {
        self.owning_pool
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.lock().state
    }

    pub fn is_available(&self) -> bool {
        self.state() == LifecycleState::Available
    }

    pub fn is_in_use(&self) -> bool {
        self.state() == LifecycleState::InUse
    }

    pub fn flags(&self) -> EntityFlags {
        self.lifecycle.lock().flags
    }

    /// Bumped on every activation; references from older uses are stale
    pub fn generation(&self) -> u32 {
        self.lifecycle.lock().generation
    }

    pub fn lifespan(&self) -> Option<Duration> {
        self.lifecycle.lock().lifespan
    }

    pub fn has_pending_expiry(&self) -> bool {
        self.lifecycle.lock().expiry.is_some()
    }

    pub fn last_released_at(&self) -> Option<Duration> {
        self.lifecycle.lock().last_released_at
    }

    pub fn is_construction_complete(&self) -> bool {
        true
    }

    /// Available -> InUse. Returns the generation of the new use, or `None`
    /// when the entity is busy or still inside its reuse delay.
    pub(crate) fn activate(&self, now: Duration, reuse_delay: Option<Duration>) -> Option<u32> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == LifecycleState::InUse {
            return None;
        }
        if let (Some(delay), Some(released_at)) = (reuse_delay, lifecycle.last_released_at) {
            if now.saturating_sub(released_at) < delay {
                return None;
            }
        }

        lifecycle.state = LifecycleState::InUse;
        lifecycle.flags = EntityFlags::LIVE;
        lifecycle.generation = lifecycle.generation.wrapping_add(1);
        lifecycle.releasing = false;
        lifecycle.lifespan = lifecycle.base_lifespan;
        Some(lifecycle.generation)
    }

    /// Arm the lifespan timer for the use identified by `generation`.
    ///
    /// An already armed timer is left alone unless `refresh` is set, in which
    /// case it is cancelled and replaced.
    pub(crate) fn schedule_expiry(
        &self,
        generation: u32,
        refresh: bool,
        scheduler: &dyn Scheduler,
        make_callback: impl FnOnce() -> TimerCallback,
    ) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != LifecycleState::InUse || lifecycle.generation != generation {
            return false;
        }
        let Some(lifespan) = lifecycle.lifespan.filter(|l| !l.is_zero()) else {
            return false;
        };
        if lifecycle.expiry.is_some() && !refresh {
            return false;
        }

        if let Some(previous) = lifecycle.expiry.take() {
            scheduler.cancel(previous);
        }
        lifecycle.expiry = Some(scheduler.schedule_once(lifespan, make_callback()));
        true
    }

    /// Replace the lifespan of the current use. The next use starts from the
    /// kind's lifespan again. `None` or zero cancels any pending expiry.
    pub(crate) fn set_lifespan(&self, lifespan: Option<Duration>, scheduler: &dyn Scheduler) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.lifespan = lifespan;
        if lifespan.is_none_or(|l| l.is_zero()) {
            if let Some(pending) = lifecycle.expiry.take() {
                scheduler.cancel(pending);
            }
        }
    }

    /// InUse -> Available.
    ///
    /// `generation` pins the release to one specific use; `None` releases
    /// whatever use is current. Order of effects: kind cleanup hook, generic
    /// deactivation (flags, timer, timestamp), then the caller notifies the
    /// owning pool.
    pub(crate) fn deactivate(
        &self,
        generation: Option<u32>,
        now: Duration,
        scheduler: &dyn Scheduler,
    ) -> Deactivation {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == LifecycleState::Available {
                return Deactivation::AlreadyAvailable;
            }
            if generation.is_some_and(|g| g != lifecycle.generation) {
                return Deactivation::Stale;
            }
            if lifecycle.releasing {
                return Deactivation::InProgress;
            }
            lifecycle.releasing = true;
        }

        self.payload.before_deactivate();

        let pending = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.state = LifecycleState::Available;
            lifecycle.flags = EntityFlags::HIDDEN;
            lifecycle.releasing = false;
            lifecycle.last_released_at = Some(now);
            lifecycle.expiry.take()
        };
        if let Some(pending) = pending {
            scheduler.cancel(pending);
        }

        Deactivation::Released
    }

    /// Drop the expiry handle of a timer that has just fired
    pub(crate) fn clear_fired_expiry(&self, generation: u32) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation == generation {
            lifecycle.expiry = None;
        }
    }
}

impl<T> fmt::Debug for PooledEntity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.lifecycle.lock();
        f.debug_struct("PooledEntity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("owning_pool", &self.owning_pool)
            .field("state", &lifecycle.state)
            .field("generation", &lifecycle.generation)
            .finish()
    }
}

/// Reference handed to the caller of `acquire`.
///
/// Pins one use of an entity: once the entity is released and acquired again
/// the old reference is stale and releasing it does nothing.
pub struct EntityRef<T> {
    entity: Weak<PooledEntity<T>>,
    id: EntityId,
    kind: TypeKey,
    generation: u32,
}

impl<T: Poolable> EntityRef<T> {
    pub(crate) fn new(entity: &Arc<PooledEntity<T>>, generation: u32) -> Self {
        Self {
            entity: Arc::downgrade(entity),
            id: entity.id(),
            kind: entity.kind().clone(),
            generation,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> &TypeKey {
        &self.kind
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The entity, unless it has been destroyed
    pub fn get(&self) -> Option<Arc<PooledEntity<T>>> {
        self.entity.upgrade()
    }

    /// Whether this reference still owns the entity
    pub fn is_current(&self) -> bool {
        self.get()
            .is_some_and(|e| e.is_in_use() && e.generation() == self.generation)
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            entity: Weak::clone(&self.entity),
            id: self.id,
            kind: self.kind.clone(),
            generation: self.generation,
        }
    }
}

impl<T> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .finish()
    }
}
