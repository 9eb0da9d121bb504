//! Fixed-block pool allocator
//!
//! # Safety
//!
//! - Blocks live in independently allocated [`Chunk`]s that are never moved
//!   or resized, so a pointer stays valid until the pool is reset or dropped
//! - The free list stores global block indices, never pointers into blocks
//! - `in_use[i]` is true exactly when block `i` has been handed out and not
//!   yet returned
//! - All bookkeeping is mutated under `state`; the atomics only mirror it
//! - Nothing is logged while `state` is locked

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::chunk::Chunk;
use super::{PoolConfig, PoolStats};
use crate::error::{MemoryError, MemoryResult};

#[cfg(feature = "logging")]
use hoard_log::{debug, trace, warn};

/// Name used in errors for pools that hold raw bytes
const RAW_POOL_NAME: &str = "raw";

/// Mutable pool bookkeeping, guarded by the pool mutex
struct PoolState {
    chunks: Vec<Chunk>,
    /// LIFO stack of free block indices; the top is the next block handed out
    free: Vec<usize>,
    in_use: Vec<bool>,
    allocated: usize,
    peak_allocated: usize,
    total_allocations: u64,
    total_deallocations: u64,
}

impl PoolState {
    fn total_blocks(&self) -> usize {
        self.in_use.len()
    }

    fn chunk_for_index(&self, index: usize) -> &Chunk {
        let pos = self
            .chunks
            .partition_point(|chunk| chunk.end_block() <= index);
        &self.chunks[pos]
    }

    fn index_of(&self, addr: usize, stride: usize) -> Option<usize> {
        self.chunks
            .iter()
            .find_map(|chunk| chunk.index_of(addr, stride))
    }

    /// Index of an owned, currently allocated block
    fn live_index(&self, addr: usize, stride: usize) -> MemoryResult<usize> {
        match self.index_of(addr, stride) {
            None => Err(MemoryError::foreign_pointer(addr)),
            Some(index) if !self.in_use[index] => Err(MemoryError::double_free(addr)),
            Some(index) => Ok(index),
        }
    }
}

/// Thread-safe allocator of fixed-size blocks
///
/// Memory is carved from chunks obtained from the global allocator. When the
/// free list is empty the pool grows once according to its
/// [`GrowthPolicy`](super::GrowthPolicy) before giving up.
///
/// # Memory Layout
/// ```text
/// chunk 0: [B0][B1][B2][B3]
/// chunk 1: [B4][B5][B6][B7]      (appended by one expansion)
/// free:    [3, 2, 7, 6, 5, 4]    (top = 4, handed out next)
/// ```
pub struct Pool {
    state: Mutex<PoolState>,
    config: PoolConfig,
    /// Block size rounded up to the alignment
    stride: usize,
    type_name: &'static str,
    allocated_blocks: AtomicUsize,
    expand_count: AtomicUsize,
}

impl Pool {
    /// Creates a pool of `block_size` byte blocks with `initial_capacity` blocks
    pub fn new(block_size: usize, initial_capacity: usize) -> MemoryResult<Self> {
        Self::with_config(PoolConfig::new(block_size, initial_capacity))
    }

    /// Creates a pool sized and aligned for `T`
    pub fn for_type<T>(initial_capacity: usize) -> MemoryResult<Self> {
        Self::named(
            PoolConfig::for_type::<T>(initial_capacity),
            core::any::type_name::<T>(),
        )
    }

    /// Creates a pool from a full configuration
    pub fn with_config(config: PoolConfig) -> MemoryResult<Self> {
        Self::named(config, RAW_POOL_NAME)
    }

    pub(crate) fn named(config: PoolConfig, type_name: &'static str) -> MemoryResult<Self> {
        config.validate()?;

        let pool = Self {
            state: Mutex::new(PoolState {
                chunks: Vec::new(),
                free: Vec::new(),
                in_use: Vec::new(),
                allocated: 0,
                peak_allocated: 0,
                total_allocations: 0,
                total_deallocations: 0,
            }),
            stride: config.stride(),
            type_name,
            allocated_blocks: AtomicUsize::new(0),
            expand_count: AtomicUsize::new(0),
            config,
        };

        if pool.config.initial_capacity > 0 {
            let mut state = pool.state.lock();
            pool.add_chunk(&mut state, pool.config.initial_capacity)?;
        }

        #[cfg(feature = "logging")]
        debug!(
            pool = pool.type_name,
            block_size = pool.stride,
            capacity = pool.config.initial_capacity,
            "Pool created"
        );

        Ok(pool)
    }

    /// Block stride in bytes
    #[inline]
    pub fn block_size(&self) -> usize {
        self.stride
    }

    /// Block alignment in bytes
    #[inline]
    pub fn block_align(&self) -> usize {
        self.config.block_align
    }

    /// Blocks currently handed out (lock-free read)
    #[inline]
    pub fn allocated_blocks(&self) -> usize {
        self.allocated_blocks.load(Ordering::Relaxed)
    }

    /// Growth steps taken since construction (lock-free read)
    #[inline]
    pub fn expand_count(&self) -> usize {
        self.expand_count.load(Ordering::Relaxed)
    }

    /// Name reported in exhaustion errors
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Capacity in bytes across all chunks
    pub fn memory_usage(&self) -> usize {
        self.state.lock().total_blocks() * self.stride
    }

    /// Hands out one zero-filled block
    ///
    /// Pops the most recently freed block. If none is free the pool grows
    /// once according to its growth policy and retries.
    pub fn allocate(&self) -> MemoryResult<NonNull<u8>> {
        let mut state = self.state.lock();

        let grown = if state.free.is_empty() {
            match self.grow_for_allocation(&mut state) {
                Ok(added) => Some((added, state.total_blocks())),
                Err(err) => {
                    drop(state);
                    self.log_exhausted(&err);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let Some(index) = state.free.pop() else {
            let err = self.exhausted(state.total_blocks());
            drop(state);
            self.log_exhausted(&err);
            return Err(err);
        };

        state.in_use[index] = true;
        state.allocated += 1;
        state.total_allocations += 1;
        state.peak_allocated = state.peak_allocated.max(state.allocated);
        self.allocated_blocks.store(state.allocated, Ordering::Relaxed);

        let block = state.chunk_for_index(index).block_ptr(index, self.stride);
        drop(state);

        // SAFETY: block was just taken off the free list, so nobody else
        // holds it, and it spans `stride` bytes inside a chunk that lives
        // as long as the pool.
        unsafe { ptr::write_bytes(block.as_ptr(), 0, self.stride) };

        #[cfg(feature = "logging")]
        {
            if let Some((added, total)) = grown {
                debug!(pool = self.type_name, added, total, "Pool grew on demand");
            }
            trace!(pool = self.type_name, index, "Block allocated");
        }
        #[cfg(not(feature = "logging"))]
        let _ = grown;

        Ok(block)
    }

    /// Returns a block to the pool
    ///
    /// Foreign pointers and blocks that are not currently allocated are
    /// rejected and leave the pool untouched.
    pub fn deallocate(&self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let addr = ptr.as_ptr() as usize;
        let mut state = self.state.lock();

        let index = match state.live_index(addr, self.stride) {
            Ok(index) => index,
            Err(err) => {
                drop(state);
                #[cfg(feature = "logging")]
                warn!(
                    pool = self.type_name,
                    address = addr,
                    code = err.code(),
                    "Rejected deallocation"
                );
                return Err(err);
            }
        };

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the block belongs to this pool and is being returned by
            // its current owner, so writing its `stride` bytes is exclusive.
            unsafe { ptr::write_bytes(ptr.as_ptr(), pattern, self.stride) };
        }

        state.in_use[index] = false;
        state.free.push(index);
        state.allocated -= 1;
        state.total_deallocations += 1;
        self.allocated_blocks.store(state.allocated, Ordering::Relaxed);
        drop(state);

        #[cfg(feature = "logging")]
        trace!(pool = self.type_name, index, "Block returned");

        Ok(())
    }

    /// Adds one chunk of `block_count` blocks
    ///
    /// The new blocks go on top of the free list, the chunk's first block
    /// being handed out first.
    pub fn expand(&self, block_count: usize) -> MemoryResult<()> {
        if block_count == 0 {
            return Err(MemoryError::invalid_config("cannot expand by zero blocks"));
        }

        let mut state = self.state.lock();
        let added = self.add_chunk(&mut state, block_count);
        let _total = state.total_blocks();
        drop(state);

        if let Err(err) = added {
            self.log_exhausted(&err);
            return Err(err);
        }
        self.expand_count.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        debug!(
            pool = self.type_name,
            added = block_count,
            total = _total,
            "Pool expanded"
        );

        Ok(())
    }

    /// Puts every block back on the free list
    ///
    /// # Safety
    ///
    /// Every pointer handed out by this pool becomes dangling. The caller must
    /// guarantee that no live object or outstanding pointer remains.
    pub unsafe fn reset(&self) {
        let mut state = self.state.lock();
        let total = state.total_blocks();

        state.free.clear();
        state.free.extend((0..total).rev());
        state.in_use.fill(false);
        state.allocated = 0;
        self.allocated_blocks.store(0, Ordering::Relaxed);
        drop(state);

        #[cfg(feature = "logging")]
        debug!(pool = self.type_name, total, "Pool reset");
    }

    /// True iff `ptr` is a block boundary inside one of this pool's chunks
    pub fn owns_pointer(&self, ptr: *const u8) -> bool {
        self.state
            .lock()
            .index_of(ptr as usize, self.stride)
            .is_some()
    }

    /// True iff `ptr` is owned by this pool and currently handed out
    pub fn is_allocated(&self, ptr: *const u8) -> bool {
        let state = self.state.lock();
        state
            .index_of(ptr as usize, self.stride)
            .is_some_and(|index| state.in_use[index])
    }

    /// Checks that `ptr` is a live block of this pool without releasing it
    pub(crate) fn check_live(&self, ptr: *const u8) -> MemoryResult<()> {
        self.state
            .lock()
            .live_index(ptr as usize, self.stride)
            .map(|_| ())
    }

    /// Consistent statistics snapshot
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let total = state.total_blocks();

        PoolStats {
            block_size: self.stride,
            total_blocks: total,
            allocated_blocks: state.allocated,
            free_blocks: state.free.len(),
            capacity_bytes: total * self.stride,
            used_bytes: state.allocated * self.stride,
            expand_count: self.expand_count.load(Ordering::Relaxed),
            chunk_count: state.chunks.len(),
            peak_allocated_blocks: state.peak_allocated,
            total_allocations: state.total_allocations,
            total_deallocations: state.total_deallocations,
        }
    }

    /// One growth attempt for an allocation that found the free list empty,
    /// returning the number of blocks added
    fn grow_for_allocation(&self, state: &mut PoolState) -> MemoryResult<usize> {
        let total = state.total_blocks();

        let mut blocks = self
            .config
            .growth
            .next_chunk(total)
            .ok_or_else(|| self.exhausted(total))?;
        if let Some(max) = self.config.max_blocks {
            blocks = blocks.min(max.saturating_sub(total));
        }
        if blocks == 0 {
            return Err(self.exhausted(total));
        }

        self.add_chunk(state, blocks)?;
        self.expand_count.fetch_add(1, Ordering::Relaxed);
        Ok(blocks)
    }

    /// Exhaustion error for this pool; logged by the caller once unlocked
    fn exhausted(&self, capacity: usize) -> MemoryError {
        MemoryError::PoolExhausted {
            type_name: self.type_name.to_string(),
            capacity,
        }
    }

    #[cfg(feature = "logging")]
    fn log_exhausted(&self, err: &MemoryError) {
        if let MemoryError::PoolExhausted { capacity, .. } = err {
            warn!(pool = self.type_name, capacity, "Memory pool exhausted");
        }
    }

    #[cfg(not(feature = "logging"))]
    fn log_exhausted(&self, _err: &MemoryError) {}

    fn add_chunk(&self, state: &mut PoolState, block_count: usize) -> MemoryResult<()> {
        let first = state.total_blocks();
        let total = first
            .checked_add(block_count)
            .ok_or_else(|| MemoryError::size_overflow("block count"))?;

        if let Some(max) = self.config.max_blocks
            && total > max
        {
            return Err(self.exhausted(first));
        }

        let chunk = Chunk::allocate(first, block_count, self.stride, self.config.block_align)?
            .ok_or_else(|| self.exhausted(first))?;

        state.free.reserve(block_count);
        state.free.extend((first..total).rev());
        state.in_use.resize(total, false);
        state.chunks.push(chunk);

        Ok(())
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("type_name", &self.type_name)
            .field("block_size", &self.stride)
            .field("allocated_blocks", &self.allocated_blocks())
            .field("expand_count", &self.expand_count())
            .finish_non_exhaustive()
    }
}
