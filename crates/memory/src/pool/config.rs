//! Pool configuration

use core::alloc::Layout;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::utils::{align_up, is_power_of_two};

/// Blocks allocated when growing a pool that currently owns no blocks
pub const DEFAULT_GROWTH_BLOCKS: usize = 32;

/// Default number of blocks in a pool's first chunk
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// How a pool grows when its free list runs dry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPolicy {
    /// New chunk as large as the current total capacity
    #[default]
    Double,
    /// New chunk of a fixed number of blocks
    Fixed(usize),
    /// Never grow past the first chunk
    Disabled,
}

impl GrowthPolicy {
    /// Number of blocks the next chunk should hold, `None` if growth is off
    #[must_use]
    pub fn next_chunk(self, total_blocks: usize) -> Option<usize> {
        match self {
            Self::Double if total_blocks == 0 => Some(DEFAULT_GROWTH_BLOCKS),
            Self::Double => Some(total_blocks),
            Self::Fixed(0) | Self::Disabled => None,
            Self::Fixed(n) => Some(n),
        }
    }
}

/// Configuration for pool allocator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Size of each block in bytes (rounded up to `block_align`)
    pub block_size: usize,

    /// Alignment of each block, must be a power of two
    pub block_align: usize,

    /// Number of blocks in the first chunk
    pub initial_capacity: usize,

    /// Growth policy when the free list is empty
    pub growth: GrowthPolicy,

    /// Hard cap on total blocks across all chunks
    pub max_blocks: Option<usize>,

    /// Fill pattern byte for deallocated memory (for debugging)
    pub dealloc_pattern: Option<u8>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size: core::mem::size_of::<usize>(),
            block_align: core::mem::align_of::<usize>(),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            growth: GrowthPolicy::Double,
            max_blocks: None,
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
        }
    }
}

impl PoolConfig {
    /// Configuration for raw blocks of `block_size` bytes
    #[must_use]
    pub fn new(block_size: usize, initial_capacity: usize) -> Self {
        Self {
            block_size,
            initial_capacity,
            ..Self::default()
        }
    }

    /// Configuration sized and aligned for `T`
    ///
    /// Zero-sized types still get a one-byte block so that every object
    /// has a distinct address.
    #[must_use]
    pub fn for_type<T>(initial_capacity: usize) -> Self {
        let layout = Layout::new::<T>();
        Self {
            block_size: layout.size().max(1),
            block_align: layout.align(),
            initial_capacity,
            ..Self::default()
        }
    }

    /// Pool that never grows past `capacity` blocks
    #[must_use]
    pub fn fixed(block_size: usize, capacity: usize) -> Self {
        Self {
            growth: GrowthPolicy::Disabled,
            max_blocks: Some(capacity),
            ..Self::new(block_size, capacity)
        }
    }

    /// Debug configuration - poisons freed blocks
    #[must_use]
    pub fn debug(block_size: usize, initial_capacity: usize) -> Self {
        Self {
            dealloc_pattern: Some(0xDD),
            ..Self::new(block_size, initial_capacity)
        }
    }

    /// Set the block alignment
    #[must_use = "builder methods must be chained or built"]
    pub fn with_align(mut self, block_align: usize) -> Self {
        self.block_align = block_align;
        self
    }

    /// Set the growth policy
    #[must_use = "builder methods must be chained or built"]
    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    /// Set the block cap
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    /// Block stride actually used by the pool
    #[must_use]
    pub fn stride(&self) -> usize {
        align_up(self.block_size, self.block_align)
    }

    /// Validate the configuration
    pub fn validate(&self) -> MemoryResult<()> {
        if self.block_size == 0 {
            return Err(MemoryError::invalid_config("block_size cannot be zero"));
        }

        if !is_power_of_two(self.block_align) {
            return Err(MemoryError::invalid_config(format!(
                "block_align {} is not a power of two",
                self.block_align
            )));
        }

        if self.block_size.checked_add(self.block_align).is_none() {
            return Err(MemoryError::size_overflow("block stride"));
        }

        if let Some(max) = self.max_blocks
            && self.initial_capacity > max
        {
            return Err(MemoryError::invalid_config(format!(
                "initial_capacity {} exceeds max_blocks {max}",
                self.initial_capacity
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_policy_doubles() {
        assert_eq!(GrowthPolicy::Double.next_chunk(0), Some(DEFAULT_GROWTH_BLOCKS));
        assert_eq!(GrowthPolicy::Double.next_chunk(8), Some(8));
        assert_eq!(GrowthPolicy::Fixed(5).next_chunk(100), Some(5));
        assert_eq!(GrowthPolicy::Fixed(0).next_chunk(100), None);
        assert_eq!(GrowthPolicy::Disabled.next_chunk(4), None);
    }

    #[test]
    fn test_for_type_layout() {
        #[repr(align(32))]
        struct Wide([u8; 40]);

        let config = PoolConfig::for_type::<Wide>(4);
        assert_eq!(config.block_align, 32);
        assert_eq!(config.stride(), 64);

        let zst = PoolConfig::for_type::<()>(4);
        assert_eq!(zst.block_size, 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(PoolConfig::new(0, 4).validate().is_err());
        assert!(PoolConfig::new(16, 4).with_align(3).validate().is_err());
        assert!(
            PoolConfig::new(16, 8)
                .with_max_blocks(4)
                .validate()
                .is_err()
        );
        assert!(PoolConfig::new(16, 4).validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"block_size":24,"growth":{"fixed":16}}"#).unwrap();
        assert_eq!(config.block_size, 24);
        assert_eq!(config.growth, GrowthPolicy::Fixed(16));
        assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    }
}
