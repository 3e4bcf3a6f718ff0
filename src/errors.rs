//! Error types for the entity pool

use crate::entity::{EntityId, PoolId};
use crate::type_key::TypeKey;
use thiserror::Error;

/// Failures surfaced by the fallible pool operations.
///
/// `acquire` and `release` never produce these; exhaustion there is an
/// ordinary `None` and a double release is silently absorbed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No entity of type '{0}' is available and the pool cannot grow")]
    Exhausted(TypeKey),

    #[error("Factory produced {created} of {requested} requested entities of type '{key}'")]
    FactoryFailed {
        key: TypeKey,
        requested: usize,
        created: usize,
    },

    #[error("No factory is registered that can build type '{0}'")]
    NoFactory(TypeKey),

    #[error("Entity {entity} belongs to pool {owner} and cannot be registered here")]
    ForeignEntity { entity: EntityId, owner: PoolId },
}

pub type PoolResult<T> = Result<T, PoolError>;
