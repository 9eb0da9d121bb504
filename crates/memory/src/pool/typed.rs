//! Typed object pool
//!
//! # Safety
//!
//! - Every block is sized and aligned for `T`, checked at construction
//! - A block holds an initialized `T` exactly while it is allocated and owned
//!   by a caller of [`TypedPool::create`] (or a [`Handle`])
//! - Constructors and destructors of `T` run with the pool lock released
//! - If a constructor or destructor unwinds, [`BlockGuard`] returns the block

use core::alloc::Layout;
use core::any::type_name;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use std::sync::Arc;

use super::{Handle, Pool, PoolConfig, PoolStats};
use crate::error::{CreateError, MemoryError, MemoryResult};
use crate::registry::UsageTracker;

#[cfg(feature = "logging")]
use hoard_log::warn;

/// Returns a block to its pool unless disarmed
struct BlockGuard<'a> {
    pool: &'a Pool,
    block: NonNull<u8>,
    armed: bool,
}

impl<'a> BlockGuard<'a> {
    fn new(pool: &'a Pool, block: NonNull<u8>) -> Self {
        Self {
            pool,
            block,
            armed: true,
        }
    }

    /// Keeps the block allocated
    fn disarm(mut self) -> NonNull<u8> {
        self.armed = false;
        self.block
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(_err) = self.pool.deallocate(self.block) {
            #[cfg(feature = "logging")]
            warn!(error = %_err, "Failed to return block after aborted construction");
        }
    }
}

/// Pool of `T` values built on a [`Pool`]
///
/// Values are written into pooled blocks and dropped in place when destroyed.
/// A `TypedPool` does not track the objects it hands out: values still live
/// when the pool is dropped are leaked, never dropped.
///
/// # Example
/// ```
/// use hoard_memory::pool::TypedPool;
///
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// let pool = TypedPool::<Point>::new(16)?;
/// let mut point = pool.alloc(Point { x: 3, y: 4 })?;
/// point.x += 1;
/// assert_eq!(*point, Point { x: 4, y: 4 });
/// drop(point);
/// assert_eq!(pool.stats().allocated_blocks, 0);
/// # Ok::<(), hoard_memory::MemoryError>(())
/// ```
pub struct TypedPool<T> {
    pool: Pool,
    tracker: Option<Arc<UsageTracker>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedPool<T> {
    /// Creates a pool with room for `initial_capacity` values
    pub fn new(initial_capacity: usize) -> MemoryResult<Self> {
        Self::with_config(PoolConfig::for_type::<T>(initial_capacity))
    }

    /// Creates a pool from a configuration
    ///
    /// The block size and alignment may exceed those of `T` but not fall
    /// below them.
    pub fn with_config(config: PoolConfig) -> MemoryResult<Self> {
        Self::build(config, None)
    }

    pub(crate) fn build(
        config: PoolConfig,
        tracker: Option<Arc<UsageTracker>>,
    ) -> MemoryResult<Self> {
        let layout = Layout::new::<T>();

        if config.block_size < layout.size() {
            return Err(MemoryError::invalid_config(format!(
                "block_size {} is smaller than {} ({} bytes)",
                config.block_size,
                type_name::<T>(),
                layout.size()
            )));
        }

        if config.block_align < layout.align() {
            return Err(MemoryError::invalid_config(format!(
                "block_align {} is weaker than {} (align {})",
                config.block_align,
                type_name::<T>(),
                layout.align()
            )));
        }

        Ok(Self {
            pool: Pool::named(config, type_name::<T>())?,
            tracker,
            _marker: PhantomData,
        })
    }

    /// Moves `value` into a pooled block
    ///
    /// On exhaustion the value is dropped and nothing is written.
    pub fn create(&self, value: T) -> MemoryResult<NonNull<T>> {
        let block = self.pool.allocate()?.cast::<T>();

        // SAFETY: the block is fresh, exclusively ours, and sized and
        // aligned for T (checked in `build`).
        unsafe { block.as_ptr().write(value) };

        self.record_create();
        Ok(block)
    }

    /// Builds a value in a pooled block
    ///
    /// The block is reserved before `init` runs. If `init` panics the block
    /// is returned and the panic continues.
    pub fn create_with<F>(&self, init: F) -> MemoryResult<NonNull<T>>
    where
        F: FnOnce() -> T,
    {
        let guard = BlockGuard::new(&self.pool, self.pool.allocate()?);

        let value = init();
        let block = guard.disarm().cast::<T>();

        // SAFETY: see `create`.
        unsafe { block.as_ptr().write(value) };

        self.record_create();
        Ok(block)
    }

    /// Builds a value with a fallible constructor
    ///
    /// A constructor error returns the block and is passed through unchanged
    /// as [`CreateError::Construct`].
    pub fn try_create_with<F, E>(&self, init: F) -> Result<NonNull<T>, CreateError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let guard = BlockGuard::new(&self.pool, self.pool.allocate()?);

        let value = init().map_err(CreateError::Construct)?;
        let block = guard.disarm().cast::<T>();

        // SAFETY: see `create`.
        unsafe { block.as_ptr().write(value) };

        self.record_create();
        Ok(block)
    }

    /// Like [`create`](Self::create) but returns an owning [`Handle`]
    pub fn alloc(&self, value: T) -> MemoryResult<Handle<'_, T>> {
        let ptr = self.create(value)?;
        // SAFETY: ptr was just created by this pool and is owned by nobody else.
        Ok(unsafe { Handle::from_raw(ptr, self) })
    }

    /// Like [`create_with`](Self::create_with) but returns an owning [`Handle`]
    pub fn alloc_with<F>(&self, init: F) -> MemoryResult<Handle<'_, T>>
    where
        F: FnOnce() -> T,
    {
        let ptr = self.create_with(init)?;
        // SAFETY: see `alloc`.
        Ok(unsafe { Handle::from_raw(ptr, self) })
    }

    /// Drops the value at `ptr` and returns its block
    ///
    /// Pointers this pool does not own, or whose block is not allocated, are
    /// rejected before any destructor runs. If `T::drop` panics the block is
    /// still returned.
    ///
    /// # Safety
    ///
    /// A live `ptr` must hold a value created by this pool that no other code
    /// will use again.
    pub unsafe fn destroy(&self, ptr: NonNull<T>) -> MemoryResult<()> {
        self.pool.check_live(ptr.as_ptr().cast())?;

        {
            let _guard = BlockGuard::new(&self.pool, ptr.cast());

            // SAFETY: the block is live, so it holds an initialized T, and the
            // caller guarantees nobody else uses it.
            unsafe { ptr::drop_in_place(ptr.as_ptr()) };
        }

        self.record_destroy();
        Ok(())
    }

    /// Moves the value at `ptr` out and returns its block
    ///
    /// # Safety
    ///
    /// Same contract as [`destroy`](Self::destroy).
    pub(crate) unsafe fn reclaim(&self, ptr: NonNull<T>) -> MemoryResult<T> {
        self.pool.check_live(ptr.as_ptr().cast())?;

        // SAFETY: the block is live and exclusively owned by the caller.
        let value = unsafe { ptr::read(ptr.as_ptr()) };
        self.pool.deallocate(ptr.cast())?;

        self.record_destroy();
        Ok(value)
    }

    /// Adds a chunk of `block_count` blocks
    pub fn expand(&self, block_count: usize) -> MemoryResult<()> {
        self.pool.expand(block_count)
    }

    /// Returns every block without dropping any value
    ///
    /// # Safety
    ///
    /// No value created by this pool may still be alive or referenced.
    pub unsafe fn reset(&self) {
        // SAFETY: forwarded caller contract.
        unsafe { self.pool.reset() };
    }

    /// Consistent statistics snapshot
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Capacity in bytes
    pub fn memory_usage(&self) -> usize {
        self.pool.memory_usage()
    }

    /// Values currently alive
    pub fn allocated_count(&self) -> usize {
        self.pool.allocated_blocks()
    }

    /// True iff `ptr` is a block boundary inside this pool
    pub fn owns_pointer(&self, ptr: *const T) -> bool {
        self.pool.owns_pointer(ptr.cast())
    }

    /// Underlying block pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    fn record_create(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.record_allocation(size_of::<T>(), type_name::<T>());
        }
    }

    fn record_destroy(&self) {
        if let Some(tracker) = &self.tracker {
            tracker.record_deallocation(size_of::<T>(), type_name::<T>());
        }
    }
}

impl<T> core::fmt::Debug for TypedPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypedPool")
            .field("pool", &self.pool)
            .field("tracked", &self.tracker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_create_destroy_reuses_address() {
        let pool = TypedPool::<Point>::new(4).unwrap();
        let first = pool.create(Point { x: 3, y: 4 }).unwrap();
        unsafe { pool.destroy(first).unwrap() };

        let second = pool.create(Point { x: 5, y: 6 }).unwrap();
        assert_eq!(first, second);
        assert_eq!(unsafe { second.as_ref() }, &Point { x: 5, y: 6 });
        unsafe { pool.destroy(second).unwrap() };
    }

    #[test]
    fn test_rejects_undersized_config() {
        let err = TypedPool::<[u64; 4]>::with_config(PoolConfig::new(8, 4)).unwrap_err();
        assert_eq!(err.code(), "MEM:CONFIG:INVALID");

        let err = TypedPool::<u64>::with_config(PoolConfig::new(8, 4).with_align(1)).unwrap_err();
        assert!(err.to_string().contains("block_align"));
    }

    #[test]
    fn test_larger_blocks_accepted() {
        let pool = TypedPool::<u32>::with_config(PoolConfig::new(64, 2).with_align(64)).unwrap();
        let value = pool.create(7).unwrap();
        assert_eq!(value.as_ptr() as usize % 64, 0);
        unsafe { pool.destroy(value).unwrap() };
    }

    #[test]
    fn test_panicking_constructor_returns_block() {
        let pool = TypedPool::<String>::new(2).unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| {
            pool.create_with(|| panic!("constructor failed"))
        }));
        assert!(result.is_err());
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_failing_constructor_passes_error_through() {
        let pool = TypedPool::<String>::new(2).unwrap();
        let err = pool
            .try_create_with(|| Err::<String, _>("no name"))
            .unwrap_err();
        assert_eq!(err.into_construct(), Some("no name"));
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_destroy_rejects_foreign_and_stale() {
        let pool = TypedPool::<u64>::new(2).unwrap();
        let other = TypedPool::<u64>::new(2).unwrap();

        let value = other.create(1).unwrap();
        let err = unsafe { pool.destroy(value) }.unwrap_err();
        assert!(matches!(err, MemoryError::ForeignPointer { .. }));

        unsafe { other.destroy(value).unwrap() };
        let err = unsafe { other.destroy(value) }.unwrap_err();
        assert!(matches!(err, MemoryError::DoubleFree { .. }));
    }

    #[test]
    fn test_panicking_drop_returns_block() {
        struct Bomb;
        impl Drop for Bomb {
            fn drop(&mut self) {
                panic!("boom");
            }
        }

        let pool = TypedPool::<Bomb>::new(1).unwrap();
        let bomb = pool.create(Bomb).unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| unsafe { pool.destroy(bomb) }));
        assert!(result.is_err());
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_nested_create_inside_constructor() {
        let pool = TypedPool::<Box<u32>>::new(2).unwrap();
        let outer = pool
            .create_with(|| {
                let inner = pool.create(Box::new(1)).unwrap();
                unsafe { pool.destroy(inner).unwrap() };
                Box::new(2)
            })
            .unwrap();
        assert_eq!(**unsafe { outer.as_ref() }, 2);
        unsafe { pool.destroy(outer).unwrap() };
    }

    #[test]
    fn test_zero_sized_values_get_distinct_addresses() {
        let pool = TypedPool::<()>::new(4).unwrap();
        let a = pool.create(()).unwrap();
        let b = pool.create(()).unwrap();
        assert_ne!(a, b);
        unsafe {
            pool.destroy(a).unwrap();
            pool.destroy(b).unwrap();
        }
    }
}
