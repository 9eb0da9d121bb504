//! Pool statistics

use core::fmt;

use serde::Serialize;

use crate::utils::format_bytes;

/// Consistent snapshot of a pool, taken under its lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Block stride in bytes
    pub block_size: usize,
    /// Blocks across all chunks
    pub total_blocks: usize,
    /// Blocks currently handed out
    pub allocated_blocks: usize,
    /// Blocks on the free list
    pub free_blocks: usize,
    /// `total_blocks * block_size`
    pub capacity_bytes: usize,
    /// `allocated_blocks * block_size`
    pub used_bytes: usize,
    /// Number of growth steps after construction
    pub expand_count: usize,
    /// Number of chunks owned by the pool
    pub chunk_count: usize,
    /// Highest `allocated_blocks` seen
    pub peak_allocated_blocks: usize,
    /// Successful allocations over the pool's lifetime
    pub total_allocations: u64,
    /// Successful deallocations over the pool's lifetime
    pub total_deallocations: u64,
}

impl PoolStats {
    /// Fraction of blocks in use, `0.0` for an empty pool
    pub fn utilization(&self) -> f64 {
        if self.total_blocks == 0 {
            0.0
        } else {
            self.allocated_blocks as f64 / self.total_blocks as f64
        }
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} blocks in use ({:.1}%), block {} B, capacity {}, {} chunk(s), {} expansion(s), peak {}",
            self.allocated_blocks,
            self.total_blocks,
            self.utilization() * 100.0,
            self.block_size,
            format_bytes(self.capacity_bytes),
            self.chunk_count,
            self.expand_count,
            self.peak_allocated_blocks,
        )
    }
}
