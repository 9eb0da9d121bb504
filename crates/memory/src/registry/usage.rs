//! Byte and allocation accounting shared by a registry's pools

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

/// Counters for one pooled type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TypeUsage {
    /// Bytes currently held by live values
    pub current_bytes: usize,
    /// Highest `current_bytes` seen
    pub peak_bytes: usize,
    /// Values created
    pub allocations: u64,
    /// Values destroyed
    pub deallocations: u64,
}

impl TypeUsage {
    fn record_allocation(&mut self, size: usize) {
        self.current_bytes = self.current_bytes.saturating_add(size);
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
        self.allocations += 1;
    }

    fn record_deallocation(&mut self, size: usize) {
        self.current_bytes = self.current_bytes.saturating_sub(size);
        self.deallocations += 1;
    }
}

/// Consistent copy of a tracker's counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MemoryUsageSnapshot {
    /// Bytes currently held across all types
    pub current_bytes: usize,
    /// Highest `current_bytes` seen
    pub peak_bytes: usize,
    /// Values created across all types
    pub allocation_count: u64,
    /// Values destroyed across all types
    pub deallocation_count: u64,
    /// Breakdown keyed by type name, sorted
    pub by_type: BTreeMap<String, TypeUsage>,
}

impl MemoryUsageSnapshot {
    /// Values created but not yet destroyed
    pub fn live_count(&self) -> u64 {
        self.allocation_count
            .saturating_sub(self.deallocation_count)
    }
}

/// Thread-safe usage accounting
///
/// Guarded by its own mutex, which is never held together with a pool lock.
#[derive(Debug, Default)]
pub struct UsageTracker {
    inner: Mutex<MemoryUsageSnapshot>,
}

impl UsageTracker {
    /// Creates an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `size` bytes created for `type_name`
    pub fn record_allocation(&self, size: usize, type_name: &str) {
        let mut usage = self.inner.lock();
        usage.current_bytes = usage.current_bytes.saturating_add(size);
        usage.peak_bytes = usage.peak_bytes.max(usage.current_bytes);
        usage.allocation_count += 1;
        update_type(&mut usage.by_type, type_name, |t| t.record_allocation(size));
    }

    /// Records `size` bytes destroyed for `type_name`
    pub fn record_deallocation(&self, size: usize, type_name: &str) {
        let mut usage = self.inner.lock();
        usage.current_bytes = usage.current_bytes.saturating_sub(size);
        usage.deallocation_count += 1;
        update_type(&mut usage.by_type, type_name, |t| {
            t.record_deallocation(size);
        });
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> MemoryUsageSnapshot {
        self.inner.lock().clone()
    }

    /// Clears every counter
    pub fn reset(&self) {
        *self.inner.lock() = MemoryUsageSnapshot::default();
    }
}

fn update_type(
    by_type: &mut BTreeMap<String, TypeUsage>,
    type_name: &str,
    apply: impl FnOnce(&mut TypeUsage),
) {
    if let Some(usage) = by_type.get_mut(type_name) {
        apply(usage);
    } else {
        let mut usage = TypeUsage::default();
        apply(&mut usage);
        by_type.insert(type_name.to_string(), usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_and_per_type_counters() {
        let tracker = UsageTracker::new();
        tracker.record_allocation(16, "Coin");
        tracker.record_allocation(16, "Coin");
        tracker.record_allocation(64, "Enemy");
        tracker.record_deallocation(16, "Coin");

        let usage = tracker.snapshot();
        assert_eq!(usage.current_bytes, 80);
        assert_eq!(usage.peak_bytes, 96);
        assert_eq!(usage.allocation_count, 3);
        assert_eq!(usage.deallocation_count, 1);
        assert_eq!(usage.live_count(), 2);

        let coin = usage.by_type["Coin"];
        assert_eq!(coin.current_bytes, 16);
        assert_eq!(coin.peak_bytes, 32);
        assert_eq!(coin.allocations, 2);
        assert_eq!(coin.deallocations, 1);
    }

    #[test]
    fn test_deallocation_never_underflows() {
        let tracker = UsageTracker::new();
        tracker.record_deallocation(128, "Ghost");
        assert_eq!(tracker.snapshot().current_bytes, 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let tracker = UsageTracker::new();
        tracker.record_allocation(8, "u64");
        tracker.reset();
        assert_eq!(tracker.snapshot(), MemoryUsageSnapshot::default());
    }
}
