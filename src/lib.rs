//! # EsoxSolutions.EntityPool
//!
//! Reusable gameplay entities (projectiles, area effects, beams) without
//! construction or destruction on the hot path.
//!
//! ## Features
//!
//! - One sub-pool per type key, created eagerly at warm-up or lazily on first
//!   request
//! - Elastic capacity: automatic growth on exhaustion plus manual `grow`
//! - Fallback to compatible types declared in a data-driven table
//! - Explicit Available / InUse state machine with per-kind cleanup hooks
//! - Self-expiry through an injected scheduler (frame-driven or tokio)
//! - Generation-checked references: a late release never touches a reused
//!   entity
//! - Two-phase construction that keeps half-built entities away from callers
//! - Health reports, metrics and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_entitypool::{FrameScheduler, PoolConfiguration, PoolManager, Poolable, TypeKey};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Bolt;
//! impl Poolable for Bolt {
//!     fn default_lifespan(&self) -> Option<Duration> {
//!         Some(Duration::from_secs(5))
//!     }
//! }
//!
//! let scheduler = Arc::new(FrameScheduler::new());
//! let config = PoolConfiguration::new()
//!     .with_initial_capacity(8)
//!     .with_warmup_types(["Bolt"])
//!     .with_factory(|_| Some(Bolt));
//! let pool = PoolManager::new(config, scheduler.clone());
//!
//! let bolt = pool.acquire(&TypeKey::new("Bolt")).unwrap();
//! assert!(bolt.is_current());
//!
//! // Nobody released it: the lifespan does
//! scheduler.advance(Duration::from_secs(6));
//! assert!(!bolt.is_current());
//! ```

mod config;
mod entity;
mod errors;
mod health;
mod metrics;
mod pool;
mod scheduler;
mod store;
mod sub_pool;
mod type_key;

pub use config::{Factory, PoolConfiguration, PoolSettings};
pub use entity::{
    EntityFlags, EntityId, EntityRef, LifecycleState, PartiallyBuiltEntity, PoolId, Poolable,
    PooledEntity,
};
pub use errors::{PoolError, PoolResult};
pub use health::{HealthStatus, PoolReport, SubPoolReport};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::PoolManager;
pub use scheduler::{FrameScheduler, Scheduler, TimerCallback, TimerHandle, TokioScheduler};
pub use store::EntityStore;
pub use type_key::{CompatibilityTable, TypeKey};
