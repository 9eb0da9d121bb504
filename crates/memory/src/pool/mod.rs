//! Fixed-block pools
//!
//! - [`Pool`]: thread-safe allocator of equally sized raw blocks
//! - [`TypedPool`]: constructs and drops `T` values inside a [`Pool`]
//! - [`Handle`]: RAII owner of one pooled value
//!
//! # Example
//! ```
//! use hoard_memory::pool::{Pool, PoolConfig, GrowthPolicy};
//!
//! let pool = Pool::with_config(
//!     PoolConfig::new(64, 8).with_growth(GrowthPolicy::Fixed(8)),
//! )?;
//! let block = pool.allocate()?;
//! assert!(pool.owns_pointer(block.as_ptr()));
//! pool.deallocate(block)?;
//! # Ok::<(), hoard_memory::MemoryError>(())
//! ```

mod allocator;
mod chunk;
pub mod config;
mod handle;
mod stats;
mod typed;

pub use allocator::Pool;
pub use config::{GrowthPolicy, PoolConfig};
pub use handle::Handle;
pub use stats::PoolStats;
pub use typed::TypedPool;
