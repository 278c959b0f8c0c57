//! Health monitoring for pools

/// Health status of a pool
///
/// # Examples
///
/// ```
/// use ttlpool::{Pool, PoolConfiguration, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let pool = Pool::new(PoolConfiguration::new(), &scheduler);
/// pool.put(1).unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.available_objects, 1);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Available objects count
    pub available_objects: usize,

    /// Whether the pool has been closed
    pub closed: bool,

    /// Whether the background sweep is still registered
    pub sweep_registered: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(
        available: usize,
        closed: bool,
        sweep_registered: bool,
        has_constructor: bool,
    ) -> Self {
        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        } else if !sweep_registered {
            // Nothing will reclaim idle expired items any more.
            warnings.push("Expiration sweep is not running".to_string());
            is_healthy = false;
        }

        if available == 0 && !has_constructor {
            warnings.push("Pool is empty and has no constructor".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            available_objects: available,
            closed,
            sweep_registered,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
