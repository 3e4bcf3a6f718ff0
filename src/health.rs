//! Per-type reports and health monitoring for entity pools

use crate::type_key::TypeKey;

/// Occupancy of one sub-pool
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubPoolReport {
    pub key: TypeKey,

    /// Live entities registered under `key`
    pub capacity: usize,

    pub available: usize,

    pub in_use: usize,
}

/// Snapshot of every sub-pool, ordered by type key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolReport {
    pub sub_pools: Vec<SubPoolReport>,
}

impl PoolReport {
    pub fn get(&self, key: &TypeKey) -> Option<&SubPoolReport> {
        self.sub_pools.iter().find(|sub_pool| &sub_pool.key == key)
    }

    pub fn capacity(&self) -> usize {
        self.sub_pools.iter().map(|s| s.capacity).sum()
    }

    pub fn available(&self) -> usize {
        self.sub_pools.iter().map(|s| s.available).sum()
    }

    pub fn in_use(&self) -> usize {
        self.sub_pools.iter().map(|s| s.in_use).sum()
    }
}

/// Health status of an entity pool
///
/// # Examples
///
/// ```
/// use esox_entitypool::{FrameScheduler, PoolConfiguration, PoolManager, Poolable};
/// use std::sync::Arc;
///
/// struct Bolt;
/// impl Poolable for Bolt {}
///
/// let config = PoolConfiguration::new()
///     .with_initial_capacity(3)
///     .with_warmup_types(["Bolt"])
///     .with_factory(|_| Some(Bolt));
/// let pool = PoolManager::new(config, Arc::new(FrameScheduler::new()));
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.available_entities, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Available entities count
    pub available_entities: usize,

    /// Entities in use
    pub active_entities: usize,

    /// Total capacity
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Derive health from a report. Exhausted sub-pools are only fatal when
    /// the pool cannot grow its way out.
    pub fn new(report: &PoolReport, can_grow: bool) -> Self {
        let (available, active, capacity) = (report.available(), report.in_use(), report.capacity());
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        // Check for high utilization
        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        for sub_pool in &report.sub_pools {
            if sub_pool.available == 0 && sub_pool.capacity > 0 {
                warnings.push(format!("Sub-pool '{}' has no available entities", sub_pool.key));
                if !can_grow {
                    is_healthy = false;
                }
            }
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available_entities: available,
            active_entities: active,
            total_capacity: capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_pool(key: &str, capacity: usize, in_use: usize) -> SubPoolReport {
        SubPoolReport {
            key: TypeKey::new(key),
            capacity,
            available: capacity - in_use,
            in_use,
        }
    }

    #[test]
    fn test_exhausted_sub_pool_is_fatal_without_growth() {
        let report = PoolReport {
            sub_pools: vec![sub_pool("Bolt", 2, 2), sub_pool("Beam", 8, 0)],
        };

        let growing = HealthStatus::new(&report, true);
        assert!(growing.is_healthy());
        assert_eq!(growing.warning_count, 1);

        let fixed = HealthStatus::new(&report, false);
        assert!(!fixed.is_healthy());
        assert!(fixed.warnings[0].contains("Bolt"));
    }

    #[test]
    fn test_high_utilization_is_unhealthy() {
        let report = PoolReport {
            sub_pools: vec![sub_pool("Bolt", 10, 10)],
        };
        let health = HealthStatus::new(&report, true);

        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 2);
        assert_eq!(report.get(&TypeKey::new("Bolt")).map(|s| s.in_use), Some(10));
    }
}
