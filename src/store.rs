//! Strong ownership of live entities

use crate::entity::{EntityId, Poolable, PooledEntity};
use dashmap::DashMap;
use std::sync::Arc;

/// The "world" that keeps pooled entities alive.
///
/// Pools only hold weak references to what they create. Removing an entity
/// here (level unload, scripted destruction) is the out-of-band destruction
/// path; the pool notices on its next scan and prunes the stale entry.
pub struct EntityStore<T> {
    entities: DashMap<EntityId, Arc<PooledEntity<T>>>,
}

impl<T: Poolable> EntityStore<T> {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, entity: PooledEntity<T>) -> Arc<PooledEntity<T>> {
        let entity = Arc::new(entity);
        self.entities.insert(entity.id(), Arc::clone(&entity));
        entity
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<PooledEntity<T>>> {
        self.entities.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Destroy an entity outside the pool's control
    pub fn despawn(&self, id: EntityId) -> Option<Arc<PooledEntity<T>>> {
        let removed = self.entities.remove(&id).map(|(_, entity)| entity);
        if removed.is_some() {
            tracing::debug!(entity = %id, "entity despawned from store");
        }
        removed
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop every entity. Pools sharing this store are left with stale
    /// entries only.
    pub fn clear(&self) {
        self.entities.clear();
    }
}

impl<T: Poolable> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
