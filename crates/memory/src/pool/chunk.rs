//! Heap chunks backing a pool
//!
//! # Safety
//!
//! - Every chunk is a separate global-allocator allocation, never resized
//! - Block `i` of a chunk lives at `start + i * stride`
//! - The chunk frees its buffer exactly once, in `Drop`

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc};

use crate::error::{MemoryError, MemoryResult};

/// One contiguous buffer of equally sized blocks
pub(crate) struct Chunk {
    ptr: NonNull<u8>,
    layout: Layout,
    /// Global index of this chunk's first block
    first_block: usize,
    block_count: usize,
}

// SAFETY: Chunk uniquely owns its heap buffer.
// - No thread-local state, the buffer is plain bytes
// - All mutation of block contents is coordinated by the owning pool's mutex
//   or by the caller that was handed the block
unsafe impl Send for Chunk {}

// SAFETY: Shared access only reads `ptr`/`layout`, which never change after
// construction.
unsafe impl Sync for Chunk {}

impl Chunk {
    /// Allocates a chunk of `block_count` blocks of `stride` bytes each.
    ///
    /// Returns `Ok(None)` when the host allocator is out of memory.
    pub(crate) fn allocate(
        first_block: usize,
        block_count: usize,
        stride: usize,
        align: usize,
    ) -> MemoryResult<Option<Self>> {
        debug_assert!(block_count > 0);

        let size = stride
            .checked_mul(block_count)
            .ok_or_else(|| MemoryError::size_overflow("chunk size calculation"))?;
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| MemoryError::size_overflow("chunk layout"))?;

        // SAFETY: layout has non-zero size (stride > 0, block_count > 0).
        let raw = unsafe { alloc(layout) };

        Ok(NonNull::new(raw).map(|ptr| Self {
            ptr,
            layout,
            first_block,
            block_count,
        }))
    }

    #[inline]
    pub(crate) fn end_block(&self) -> usize {
        self.first_block + self.block_count
    }

    #[inline]
    fn start_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Global block index for `addr`, if it is a block boundary inside this chunk
    pub(crate) fn index_of(&self, addr: usize, stride: usize) -> Option<usize> {
        let start = self.start_addr();
        if addr < start || addr >= start + self.layout.size() {
            return None;
        }

        let offset = addr - start;
        if !offset.is_multiple_of(stride) {
            return None;
        }

        Some(self.first_block + offset / stride)
    }

    /// Pointer to the block with global index `index`
    ///
    /// `index` must lie in `first_block..end_block`.
    pub(crate) fn block_ptr(&self, index: usize, stride: usize) -> NonNull<u8> {
        debug_assert!(index >= self.first_block && index < self.end_block());
        let offset = (index - self.first_block) * stride;

        // SAFETY: offset is strictly inside the allocation (index bounds
        // asserted above), so the result is in bounds and non-null.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by `alloc` with exactly this layout and is
        // freed only here.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_aligned;

    #[test]
    fn test_index_of_respects_stride_and_bounds() {
        let chunk = Chunk::allocate(10, 4, 16, 8).unwrap().unwrap();
        let base = chunk.block_ptr(10, 16).as_ptr() as usize;

        assert_eq!(chunk.index_of(base, 16), Some(10));
        assert_eq!(chunk.index_of(base + 48, 16), Some(13));
        assert_eq!(chunk.index_of(base + 8, 16), None);
        assert_eq!(chunk.index_of(base + 64, 16), None);
        assert_eq!(chunk.index_of(base.wrapping_sub(16), 16), None);
        assert_eq!(chunk.end_block(), 14);
    }

    #[test]
    fn test_blocks_are_aligned() {
        let chunk = Chunk::allocate(0, 3, 64, 64).unwrap().unwrap();
        for i in 0..chunk.end_block() {
            assert!(is_aligned(chunk.block_ptr(i, 64).as_ptr() as usize, 64));
        }
    }

    #[test]
    fn test_overflowing_size_is_rejected() {
        let err = Chunk::allocate(0, usize::MAX, 16, 8).err().unwrap();
        assert_eq!(err.code(), "MEM:CONFIG:OVERFLOW");
    }
}
