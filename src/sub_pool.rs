//! Per-type collection of pooled entities

use crate::entity::{EntityId, Poolable, PooledEntity};
use crate::type_key::TypeKey;

use std::sync::{Arc, Weak};
use std::time::Duration;

struct Entry<T> {
    id: EntityId,
    entity: Weak<PooledEntity<T>>,
}

/// All entities registered under one type key, in registration order.
///
/// Entries are weak; an entry whose entity has been despawned stays until
/// [`prune_stale`](SubPool::prune_stale) runs.
pub(crate) struct SubPool<T> {
    key: TypeKey,
    entries: Vec<Entry<T>>,
}

impl<T: Poolable> SubPool<T> {
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            entries: Vec::new(),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Register an entity. Returns false if it is already present.
    pub fn insert(&mut self, entity: &Arc<PooledEntity<T>>) -> bool {
        if self.contains(entity.id()) {
            return false;
        }
        self.entries.push(Entry {
            id: entity.id(),
            entity: Arc::downgrade(entity),
        });
        true
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Remove entries whose entity no longer exists. Returns how many went.
    pub fn prune_stale(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.entity.strong_count() > 0);
        before - self.entries.len()
    }

    /// Claim the first available entity in registration order.
    ///
    /// The claim flips the entity to `InUse` before the scan returns, so no
    /// second caller can observe it as available.
    pub fn claim_first_available(
        &self,
        now: Duration,
        reuse_delay: Option<Duration>,
    ) -> Option<(Arc<PooledEntity<T>>, u32)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.entity.upgrade())
            .find_map(|entity| {
                let generation = entity.activate(now, reuse_delay)?;
                Some((entity, generation))
            })
    }

    /// Registered entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn live(&self) -> impl Iterator<Item = Arc<PooledEntity<T>>> + '_ {
        self.entries.iter().filter_map(|entry| entry.entity.upgrade())
    }

    pub fn available_count(&self) -> usize {
        self.live().filter(|entity| entity.is_available()).count()
    }

    pub fn in_use_count(&self) -> usize {
        self.live().filter(|entity| entity.is_in_use()).count()
    }
}
