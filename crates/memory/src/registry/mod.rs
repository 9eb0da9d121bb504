//! Registry of typed pools
//!
//! A [`PoolRegistry`] owns one [`TypedPool`] per type, created on first use,
//! plus usage accounting and operation timing for everything it hands out.
//! It is a plain value: share it with `Arc` and create as many as needed.
//!
//! # Example
//! ```
//! use hoard_memory::registry::PoolRegistry;
//! use std::sync::Arc;
//!
//! struct Bullet {
//!     speed: f32,
//! }
//!
//! let registry = PoolRegistry::new();
//! let bullets = registry.pool::<Bullet>()?;
//! assert!(Arc::ptr_eq(&bullets, &registry.pool::<Bullet>()?));
//!
//! let bullet = bullets.alloc(Bullet { speed: 9.5 })?;
//! assert_eq!(registry.usage().live_count(), 1);
//! drop(bullet);
//! assert_eq!(registry.usage().live_count(), 0);
//! # Ok::<(), hoard_memory::MemoryError>(())
//! ```

mod report;
mod timing;
mod usage;

use core::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use report::{CSV_HEADER, MemoryReport, ReportFormat};
pub use timing::{OperationGuard, OperationId, OperationStats, OperationTimer};
pub use usage::{MemoryUsageSnapshot, TypeUsage, UsageTracker};

use crate::error::{MemoryError, MemoryResult};
use crate::pool::config::DEFAULT_INITIAL_CAPACITY;
use crate::pool::{GrowthPolicy, PoolConfig, PoolStats, TypedPool};

#[cfg(feature = "logging")]
use hoard_log::{debug, info, warn};

/// Type-erased view of a registered pool
pub trait ErasedPool: Send + Sync {
    /// Name of the pooled type
    fn type_name(&self) -> &'static str;

    /// Statistics of the underlying block pool
    fn stats(&self) -> PoolStats;

    /// Upcast for downcasting back to the concrete pool
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: 'static> ErasedPool for TypedPool<T> {
    fn type_name(&self) -> &'static str {
        self.pool().type_name()
    }

    fn stats(&self) -> PoolStats {
        TypedPool::stats(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// First-chunk capacity of pools created by [`PoolRegistry::pool`]
    pub default_capacity: usize,
    /// Growth policy of pools created by [`PoolRegistry::pool`]
    pub growth: GrowthPolicy,
    /// Whether registry pools report to the usage tracker
    pub track_usage: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_INITIAL_CAPACITY,
            growth: GrowthPolicy::Double,
            track_usage: true,
        }
    }
}

/// Per-type pool registry with usage statistics and operation timing
pub struct PoolRegistry {
    config: RegistryConfig,
    pools: RwLock<HashMap<TypeId, Arc<dyn ErasedPool>>>,
    usage: Arc<UsageTracker>,
    timer: OperationTimer,
}

impl PoolRegistry {
    /// Creates an empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates an empty registry
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            pools: RwLock::new(HashMap::new()),
            usage: Arc::new(UsageTracker::new()),
            timer: OperationTimer::new(),
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Pool for `T`, created with the registry defaults on first use
    pub fn pool<T: 'static>(&self) -> MemoryResult<Arc<TypedPool<T>>> {
        self.pool_with::<T>(
            PoolConfig::for_type::<T>(self.config.default_capacity)
                .with_growth(self.config.growth),
        )
    }

    /// Pool for `T`, created from `config` on first use
    ///
    /// Later calls return the existing pool whatever `config` says.
    pub fn pool_with<T: 'static>(&self, config: PoolConfig) -> MemoryResult<Arc<TypedPool<T>>> {
        let id = TypeId::of::<T>();

        let existing = self.pools.read().get(&id).cloned();
        if let Some(entry) = existing {
            return Self::existing::<T>(entry, &config);
        }

        // Built outside the map lock; a racing registration wins and this
        // candidate is dropped.
        let tracker = self.config.track_usage.then(|| Arc::clone(&self.usage));
        let pool = Arc::new(TypedPool::<T>::build(config.clone(), tracker)?);

        let mut pools = self.pools.write();
        if let Some(entry) = pools.get(&id).cloned() {
            drop(pools);
            return Self::existing::<T>(entry, &config);
        }
        pools.insert(id, Arc::clone(&pool) as Arc<dyn ErasedPool>);
        let _registered = pools.len();
        drop(pools);

        #[cfg(feature = "logging")]
        info!(
            pool = core::any::type_name::<T>(),
            registered = _registered,
            "Registered pool"
        );

        Ok(pool)
    }

    fn existing<T: 'static>(
        entry: Arc<dyn ErasedPool>,
        _requested: &PoolConfig,
    ) -> MemoryResult<Arc<TypedPool<T>>> {
        let pool = entry.into_any().downcast::<TypedPool<T>>().map_err(|_| {
            MemoryError::invalid_config(format!(
                "registry entry for {} holds a different type",
                core::any::type_name::<T>()
            ))
        })?;

        #[cfg(feature = "logging")]
        if pool.pool().config() != _requested {
            debug!(
                pool = core::any::type_name::<T>(),
                "Pool already exists, ignoring new configuration"
            );
        }

        Ok(pool)
    }

    /// Whether a pool for `T` exists
    pub fn contains<T: 'static>(&self) -> bool {
        self.pools.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of registered pools
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Block statistics of every pool, sorted by type name
    pub fn pool_stats(&self) -> Vec<(&'static str, PoolStats)> {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        let mut stats: Vec<_> = pools
            .iter()
            .map(|pool| (pool.type_name(), pool.stats()))
            .collect();
        stats.sort_by_key(|(name, _)| *name);
        stats
    }

    /// Records `size` bytes created for `type_name`
    pub fn record_allocation(&self, size: usize, type_name: &str) {
        self.usage.record_allocation(size, type_name);
    }

    /// Records `size` bytes destroyed for `type_name`
    pub fn record_deallocation(&self, size: usize, type_name: &str) {
        self.usage.record_deallocation(size, type_name);
    }

    /// Consistent copy of the usage counters
    pub fn usage(&self) -> MemoryUsageSnapshot {
        self.usage.snapshot()
    }

    /// Starts timing an operation
    pub fn start_operation(&self, name: &str) -> OperationId {
        self.timer.start(name)
    }

    /// Ends an operation, `None` for an unknown id
    pub fn end_operation(&self, id: OperationId) -> Option<Duration> {
        self.timer.end(id)
    }

    /// Times an operation until the guard drops
    pub fn time_operation(&self, name: &str) -> OperationGuard<'_> {
        OperationGuard::new(&self.timer, name)
    }

    /// Accumulated timings per operation name
    pub fn operation_stats(&self) -> BTreeMap<String, OperationStats> {
        self.timer.stats()
    }

    /// Snapshot of usage, timings and pool statistics
    pub fn report(&self) -> MemoryReport {
        MemoryReport {
            usage: self.usage(),
            operations: self.operation_stats(),
            pools: self
                .pool_stats()
                .into_iter()
                .map(|(name, stats)| (name.to_string(), stats))
                .collect(),
        }
    }

    /// Writes the current report to `writer`
    pub fn write_memory_report<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        format: ReportFormat,
    ) -> io::Result<()> {
        self.report().write_to(writer, format)
    }

    /// Prints the text report to stdout
    pub fn print_memory_usage(&self) {
        let mut stdout = io::stdout().lock();
        if let Err(_err) = self.write_memory_report(&mut stdout, ReportFormat::Text) {
            #[cfg(feature = "logging")]
            warn!(error = %_err, "Failed to print memory usage");
        }
    }

    /// Writes the CSV report to `path`
    pub fn export_memory_report(&self, path: impl AsRef<Path>) -> MemoryResult<()> {
        let path = path.as_ref();
        let failed = |err: io::Error| MemoryError::report_failed(path, &err);

        #[cfg(feature = "logging")]
        let _timer = hoard_log::TimerGuard::new("export_memory_report");

        let mut file = BufWriter::new(File::create(path).map_err(failed)?);
        self.write_memory_report(&mut file, ReportFormat::Csv)
            .map_err(failed)?;
        file.flush().map_err(failed)?;

        #[cfg(feature = "logging")]
        debug!(path = %path.display(), "Exported memory report");

        Ok(())
    }

    /// Clears usage counters and operation totals; pools are untouched
    pub fn reset_statistics(&self) {
        self.usage.reset();
        self.timer.reset();
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("config", &self.config)
            .field("pool_count", &self.pool_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Coin(u32);

    struct Enemy {
        _hp: u64,
    }

    #[test]
    fn test_pool_is_singleton_per_type() {
        let registry = PoolRegistry::new();
        let a = registry.pool::<Coin>().unwrap();
        let b = registry.pool::<Coin>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        registry.pool::<Enemy>().unwrap();
        assert_eq!(registry.pool_count(), 2);
        assert!(registry.contains::<Enemy>());
        assert!(!registry.contains::<u8>());
    }

    #[test]
    fn test_independent_registries() {
        let first = PoolRegistry::new();
        let second = PoolRegistry::new();
        let a = first.pool::<Coin>().unwrap();
        let b = second.pool::<Coin>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_first_config_wins() {
        let registry = PoolRegistry::new();
        let custom = registry
            .pool_with::<Coin>(PoolConfig::for_type::<Coin>(3))
            .unwrap();
        assert_eq!(custom.stats().total_blocks, 3);

        let default = registry.pool::<Coin>().unwrap();
        assert_eq!(default.stats().total_blocks, 3);
    }

    #[test]
    fn test_invalid_first_config_registers_nothing() {
        let registry = PoolRegistry::new();
        assert!(registry.pool_with::<u64>(PoolConfig::new(1, 4)).is_err());
        assert_eq!(registry.pool_count(), 0);
    }

    #[test]
    fn test_pools_report_usage() {
        let registry = PoolRegistry::new();
        let coins = registry.pool::<Coin>().unwrap();
        let coin = coins.create(Coin(5)).unwrap();

        let usage = registry.usage();
        assert_eq!(usage.current_bytes, size_of::<Coin>());
        assert_eq!(usage.by_type[core::any::type_name::<Coin>()].allocations, 1);

        unsafe { coins.destroy(coin).unwrap() };
        assert_eq!(registry.usage().current_bytes, 0);
    }

    #[test]
    fn test_untracked_registry() {
        let registry = PoolRegistry::with_config(RegistryConfig {
            track_usage: false,
            ..RegistryConfig::default()
        });
        let coins = registry.pool::<Coin>().unwrap();
        let _coin = coins.alloc(Coin(1)).unwrap();
        assert_eq!(registry.usage().allocation_count, 0);
    }

    #[test]
    fn test_operations_and_reset() {
        let registry = PoolRegistry::new();
        let id = registry.start_operation("load_level");
        assert!(registry.end_operation(id).is_some());
        drop(registry.time_operation("load_level"));
        assert_eq!(registry.operation_stats()["load_level"].count, 2);

        registry.record_allocation(32, "Buffer");
        registry.reset_statistics();
        assert!(registry.operation_stats().is_empty());
        assert_eq!(registry.usage().current_bytes, 0);
    }

    #[test]
    fn test_pool_stats_sorted() {
        let registry = PoolRegistry::new();
        registry.pool::<u64>().unwrap();
        registry.pool::<Coin>().unwrap();
        registry.pool::<u8>().unwrap();

        let names: Vec<_> = registry.pool_stats().into_iter().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
