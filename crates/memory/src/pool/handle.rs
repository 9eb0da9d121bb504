//! Owning handle to a pooled value

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use super::TypedPool;

#[cfg(feature = "logging")]
use hoard_log::warn;

/// RAII owner of one value in a [`TypedPool`]
///
/// Like `Box`, but the value lives in a pool block. Dropping the handle
/// destroys the value and returns the block. The borrow of the pool keeps the
/// pool alive for as long as any handle exists.
pub struct Handle<'pool, T> {
    ptr: Option<NonNull<T>>,
    pool: &'pool TypedPool<T>,
}

// SAFETY: a handle exclusively owns its value, so sending the handle sends
// the value; `&TypedPool` is Send because `TypedPool` is Sync.
unsafe impl<T: Send> Send for Handle<'_, T> {}

// SAFETY: `&Handle` only gives out `&T`.
unsafe impl<T: Sync> Sync for Handle<'_, T> {}

impl<'pool, T> Handle<'pool, T> {
    /// Adopts a value created by `pool`
    ///
    /// # Safety
    ///
    /// `ptr` must come from `pool.create*` and must not be owned, used or
    /// destroyed by anything else afterwards.
    pub unsafe fn from_raw(ptr: NonNull<T>, pool: &'pool TypedPool<T>) -> Self {
        Self {
            ptr: Some(ptr),
            pool,
        }
    }

    /// Shared access, `None` once the handle is empty
    pub fn get(&self) -> Option<&T> {
        // SAFETY: an owned pointer refers to a live, initialized value that
        // only this handle can reach.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Exclusive access, `None` once the handle is empty
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: as in `get`, and `&mut self` rules out other borrows.
        self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// Raw pointer to the value without giving up ownership
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// True after `release`, `reset` or `take`
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Pool the value lives in
    pub fn pool(&self) -> &'pool TypedPool<T> {
        self.pool
    }

    /// Gives up ownership without destroying the value
    ///
    /// The caller becomes responsible for passing the pointer to
    /// [`TypedPool::destroy`].
    #[must_use = "the released value leaks unless it is destroyed"]
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Destroys the value and empties the handle; no-op when already empty
    pub fn reset(&mut self) {
        let Some(ptr) = self.ptr.take() else {
            return;
        };

        // SAFETY: the handle owned `ptr` exclusively and has just given it up.
        if let Err(_err) = unsafe { self.pool.destroy(ptr) } {
            #[cfg(feature = "logging")]
            warn!(error = %_err, "Handle could not destroy its value");
        }
    }

    /// Moves the value out and returns its block
    pub fn take(&mut self) -> Option<T> {
        let ptr = self.ptr.take()?;

        // SAFETY: the handle owned `ptr` exclusively and has just given it up.
        match unsafe { self.pool.reclaim(ptr) } {
            Ok(value) => Some(value),
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(error = %_err, "Handle could not reclaim its value");
                None
            }
        }
    }
}

impl<T> Deref for Handle<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty pool handle"),
        }
    }
}

impl<T> DerefMut for Handle<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("dereferenced an empty pool handle"),
        }
    }
}

impl<T> Drop for Handle<'_, T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Handle").field(value).finish(),
            None => f.write_str("Handle(<empty>)"),
        }
    }
}
