//! Metrics collection and export for pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time counters for a pool
///
/// # Examples
///
/// ```
/// use ttlpool::{Pool, PoolConfiguration, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let pool = Pool::new(PoolConfiguration::new(), &scheduler);
///
/// pool.put(1).unwrap();
/// pool.put(2).unwrap();
/// let _ = pool.get().unwrap();
///
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_put, 2);
/// assert_eq!(metrics.total_retrieved, 1);
/// assert_eq!(metrics.available_objects, 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Successful puts
    pub total_put: usize,

    /// Puts rejected because the pool was closed
    pub rejected_puts: usize,

    /// Gets served from stored items
    pub total_retrieved: usize,

    /// Gets served by the constructor
    pub total_constructed: usize,

    /// Constructor calls that failed
    pub construction_failures: usize,

    /// Gets that failed with an empty pool and no constructor
    pub pool_empty_events: usize,

    /// Expired items dropped on the acquisition path without destruction
    pub lazily_discarded: usize,

    /// Expired items removed by the background sweep
    pub swept_expired: usize,

    /// Values handed to the destructor
    pub destroyed: usize,

    /// Sweep invocations
    pub sweep_runs: usize,

    /// Current available objects
    pub available_objects: usize,

    /// Whether the pool has been closed
    pub closed: bool,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_put".to_string(), self.total_put.to_string());
        metrics.insert("rejected_puts".to_string(), self.rejected_puts.to_string());
        metrics.insert("total_retrieved".to_string(), self.total_retrieved.to_string());
        metrics.insert("total_constructed".to_string(), self.total_constructed.to_string());
        metrics.insert("construction_failures".to_string(), self.construction_failures.to_string());
        metrics.insert("pool_empty_events".to_string(), self.pool_empty_events.to_string());
        metrics.insert("lazily_discarded".to_string(), self.lazily_discarded.to_string());
        metrics.insert("swept_expired".to_string(), self.swept_expired.to_string());
        metrics.insert("destroyed".to_string(), self.destroyed.to_string());
        metrics.insert("sweep_runs".to_string(), self.sweep_runs.to_string());
        metrics.insert("available_objects".to_string(), self.available_objects.to_string());
        metrics.insert("closed".to_string(), self.closed.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use ttlpool::{MetricsExporter, Pool, PoolConfiguration, Scheduler};
    /// use std::collections::HashMap;
    ///
    /// let scheduler = Scheduler::new();
    /// let pool = Pool::new(PoolConfiguration::new(), &scheduler);
    /// pool.put("conn").unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let metrics = pool.get_metrics();
    /// let output = MetricsExporter::export_prometheus(&metrics, "my_pool", Some(&tags)).unwrap();
    /// assert!(output.contains("ttlpool_objects_available"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }
        let registry = Registry::new_custom(Some("ttlpool".to_string()), Some(labels))?;

        let available = i64::try_from(metrics.available_objects).unwrap_or(i64::MAX);
        let gauges = [
            ("objects_available", "Current available objects", available),
            ("closed", "Whether the pool is closed", i64::from(metrics.closed)),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help))?;
            gauge.set(value);
            registry.register(Box::new(gauge))?;
        }

        let counters = [
            ("puts_total", "Successful puts", metrics.total_put),
            ("puts_rejected_total", "Puts rejected by a closed pool", metrics.rejected_puts),
            ("objects_retrieved_total", "Gets served from the pool", metrics.total_retrieved),
            (
                "objects_constructed_total",
                "Gets served by the constructor",
                metrics.total_constructed,
            ),
            (
                "construction_failures_total",
                "Failed constructor calls",
                metrics.construction_failures,
            ),
            ("events_empty_total", "Pool empty events", metrics.pool_empty_events),
            ("objects_discarded_total", "Expired objects dropped on get", metrics.lazily_discarded),
            ("objects_swept_total", "Expired objects removed by the sweep", metrics.swept_expired),
            ("objects_destroyed_total", "Objects passed to the destructor", metrics.destroyed),
            ("sweeps_total", "Sweep invocations", metrics.sweep_runs),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            counter.inc_by(u64::try_from(value).unwrap_or(u64::MAX));
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_put: AtomicUsize,
    pub rejected_puts: AtomicUsize,
    pub total_retrieved: AtomicUsize,
    pub total_constructed: AtomicUsize,
    pub construction_failures: AtomicUsize,
    pub pool_empty_events: AtomicUsize,
    pub lazily_discarded: AtomicUsize,
    pub swept_expired: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub sweep_runs: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn get_metrics(&self, available: usize, closed: bool) -> PoolMetrics {
        PoolMetrics {
            total_put: self.total_put.load(Ordering::Relaxed),
            rejected_puts: self.rejected_puts.load(Ordering::Relaxed),
            total_retrieved: self.total_retrieved.load(Ordering::Relaxed),
            total_constructed: self.total_constructed.load(Ordering::Relaxed),
            construction_failures: self.construction_failures.load(Ordering::Relaxed),
            pool_empty_events: self.pool_empty_events.load(Ordering::Relaxed),
            lazily_discarded: self.lazily_discarded.load(Ordering::Relaxed),
            swept_expired: self.swept_expired.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            sweep_runs: self.sweep_runs.load(Ordering::Relaxed),
            available_objects: available,
            closed,
        }
    }
}
