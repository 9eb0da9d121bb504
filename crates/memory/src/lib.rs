//! # hoard-memory
//!
//! Fixed-block memory pools for game-engine style workloads.
//!
//! This crate provides:
//! - [`Pool`](pool::Pool): a thread-safe allocator of equally sized blocks
//!   that grows in chunks and never moves memory it has handed out
//! - [`TypedPool`](pool::TypedPool): constructs and drops values inside a pool,
//!   returning the block when a constructor fails or panics
//! - [`Handle`](pool::Handle): RAII owner of one pooled value
//! - [`PoolRegistry`](registry::PoolRegistry): one pool per type plus usage
//!   statistics, operation timing and reports
//! - [`LeakLedger`](leak::LeakLedger): address-keyed leak tracking
//!
//! ## Quick Start
//!
//! ```rust
//! use hoard_memory::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Particle {
//!     x: f32,
//!     y: f32,
//! }
//!
//! let registry = PoolRegistry::new();
//! let particles = registry.pool::<Particle>()?;
//!
//! let mut p = particles.alloc(Particle { x: 0.0, y: 1.0 })?;
//! p.x += 2.0;
//! assert_eq!(p.x, 2.0);
//! // block goes back to the pool when `p` is dropped
//! # drop(p);
//! # assert_eq!(particles.allocated_count(), 0);
//! # Ok::<(), MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging via `hoard-log`
//! - `stack-traces`: capture stack traces in the leak ledger
//! - `full`: enable all features

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rust_2018_idioms)]
#![allow(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// Precision loss in usize/u64 -> f64 casts is acceptable for stats
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::inline_always)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::double_must_use)]

// Error types
pub mod error;

// Core modules
pub mod leak;
pub mod pool;
pub mod registry;
pub mod utils;

pub use crate::error::{CreateError, MemoryError, MemoryResult, Result};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::error::{CreateError, MemoryError, MemoryResult};

    pub use crate::pool::{GrowthPolicy, Handle, Pool, PoolConfig, PoolStats, TypedPool};

    pub use crate::registry::{
        MemoryUsageSnapshot, OperationId, PoolRegistry, RegistryConfig, ReportFormat,
    };

    pub use crate::leak::{LeakLedger, LedgerConfig, LeakRecord};

    pub use crate::track_alloc;
}
