//! Metrics collection and export for entity pools

use crate::health::PoolReport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
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
///     .with_factory(|_| Some(Bolt));
/// let pool = PoolManager::new(config, Arc::new(FrameScheduler::new()));
///
/// let _bolt = pool.acquire(&"Bolt".into()).unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.active_entities, 1);
/// assert_eq!(metrics.capacity, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetrics {
    /// Successful acquisitions
    pub total_acquired: usize,

    /// Entities returned to available state
    pub total_released: usize,

    /// Acquisitions that came back empty
    pub exhausted_events: usize,

    /// Automatic and manual growth events
    pub growth_events: usize,

    /// Entities built by factories or adopted
    pub entities_created: usize,

    /// Stale entries removed during scans
    pub stale_pruned: usize,

    /// Releases triggered by a lifespan timer
    pub expirations: usize,

    /// Acquisitions served from a compatible sub-pool
    pub fallback_hits: usize,

    /// Entities currently in use
    pub active_entities: usize,

    /// Entities currently available
    pub available_entities: usize,

    /// Live entities across all sub-pools
    pub capacity: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("growth_events".to_string(), self.growth_events.to_string());
        metrics.insert("entities_created".to_string(), self.entities_created.to_string());
        metrics.insert("stale_pruned".to_string(), self.stale_pruned.to_string());
        metrics.insert("expirations".to_string(), self.expirations.to_string());
        metrics.insert("fallback_hits".to_string(), self.fallback_hits.to_string());
        metrics.insert("active_entities".to_string(), self.active_entities.to_string());
        metrics.insert("available_entities".to_string(), self.available_entities.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format, with per-type gauges
    /// labelled by `type`.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_entitypool::{FrameScheduler, PoolConfiguration, PoolManager, Poolable};
    /// use std::collections::HashMap;
    /// use std::sync::Arc;
    ///
    /// struct Bolt;
    /// impl Poolable for Bolt {}
    ///
    /// let config = PoolConfiguration::new()
    ///     .with_initial_capacity(2)
    ///     .with_warmup_types(["Bolt"])
    ///     .with_factory(|_| Some(Bolt));
    /// let pool = PoolManager::new(config, Arc::new(FrameScheduler::new()));
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("level".to_string(), "crypt".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("spells", Some(&tags));
    /// assert!(output.contains("entitypool_entities_available"));
    /// assert!(output.contains("level=\"crypt\""));
    /// assert!(output.contains("type=\"Bolt\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        report: &PoolReport,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        match Self::render(metrics, report, pool_name, tags) {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(pool = pool_name, %error, "failed to render prometheus metrics");
                String::new()
            }
        }
    }

    fn render(
        metrics: &PoolMetrics,
        report: &PoolReport,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};

        let labels = Self::format_labels(pool_name, tags);
        let registry = Registry::new();
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        // Gauge metrics, per type
        let per_type = [
            ("entitypool_entities_active", "Entities currently in use"),
            ("entitypool_entities_available", "Entities currently available"),
            ("entitypool_capacity", "Live entities registered"),
        ];
        for (index, (name, help)) in per_type.into_iter().enumerate() {
            let gauge = IntGaugeVec::new(opts(name, help), &["type"])?;
            for sub_pool in &report.sub_pools {
                let value = match index {
                    0 => sub_pool.in_use,
                    1 => sub_pool.available,
                    _ => sub_pool.capacity,
                };
                gauge
                    .with_label_values(&[sub_pool.key.as_str()])
                    .set(value as i64);
            }
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::with_opts(opts("entitypool_utilization", "Pool utilization ratio"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        // Counter metrics
        let counters = [
            ("entitypool_acquired_total", "Total entities acquired", metrics.total_acquired),
            ("entitypool_released_total", "Total entities released", metrics.total_released),
            ("entitypool_exhausted_total", "Acquisitions that found nothing", metrics.exhausted_events),
            ("entitypool_growth_total", "Growth events", metrics.growth_events),
            ("entitypool_created_total", "Entities created", metrics.entities_created),
            ("entitypool_stale_pruned_total", "Stale entries pruned", metrics.stale_pruned),
            ("entitypool_expired_total", "Lifespan expirations", metrics.expirations),
            ("entitypool_fallback_total", "Acquisitions served by a compatible type", metrics.fallback_hits),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        labels
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub exhausted_events: AtomicUsize,
    pub growth_events: AtomicUsize,
    pub entities_created: AtomicUsize,
    pub stale_pruned: AtomicUsize,
    pub expirations: AtomicUsize,
    pub fallback_hits: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize, amount: usize) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, report: &PoolReport) -> PoolMetrics {
        let (active, available, capacity) = (report.in_use(), report.available(), report.capacity());
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            growth_events: self.growth_events.load(Ordering::Relaxed),
            entities_created: self.entities_created.load(Ordering::Relaxed),
            stale_pruned: self.stale_pruned.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            active_entities: active,
            available_entities: available,
            capacity,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::SubPoolReport;
    use crate::type_key::TypeKey;

    fn report() -> PoolReport {
        PoolReport {
            sub_pools: vec![
                SubPoolReport {
                    key: TypeKey::new("Bolt"),
                    capacity: 4,
                    available: 1,
                    in_use: 3,
                },
                SubPoolReport {
                    key: TypeKey::new("Beam"),
                    capacity: 4,
                    available: 4,
                    in_use: 0,
                },
            ],
        }
    }

    #[test]
    fn test_snapshot_uses_report_totals() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.total_acquired, 3);

        let metrics = tracker.get_metrics(&report());
        assert_eq!(metrics.total_acquired, 3);
        assert_eq!(metrics.active_entities, 3);
        assert_eq!(metrics.available_entities, 5);
        assert_eq!(metrics.capacity, 8);
        assert!((metrics.utilization - 0.375).abs() < f64::EPSILON);
        assert_eq!(metrics.export()["utilization"], "0.38");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export_has_per_type_gauges() {
        let tracker = MetricsTracker::new();
        let report = report();
        let output =
            MetricsExporter::export_prometheus(&tracker.get_metrics(&report), &report, "spells", None);

        assert!(output.contains("# TYPE entitypool_entities_active gauge"));
        assert!(output.contains("type=\"Beam\""));
        assert!(output.contains("pool=\"spells\""));
        assert!(output.contains("entitypool_acquired_total"));
    }
}
