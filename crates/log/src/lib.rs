//! # hoard-log
//!
//! Logging setup shared by the hoard crates.
//!
//! ## Quick Start
//!
//! ```rust
//! use hoard_log::prelude::*;
//!
//! fn main() -> LogResult<()> {
//!     // Auto-detect best configuration
//!     let _guard = hoard_log::auto_init()?;
//!
//!     info!(pools = 3, "Pools ready");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;
mod macros;
mod timer;

// Public API
pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};
pub use timer::{Timer, TimerGuard};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Config, Format, LogError, LogResult, Timer, auto_init, debug, error, info, init,
        init_with, trace, warn,
    };

    pub use tracing::{Level, Span, field};
}

// Re-export tracing macros
pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};

// ============================================================================
// Initialization Functions
// ============================================================================

/// Auto-detect and initialize the best logging configuration
///
/// Environment variables win; otherwise debug builds get the development
/// preset and release builds the production preset.
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var(config::LEVEL_ENV).is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests; a logger installed earlier is not an error
pub fn init_test() -> LogResult<Option<LoggerGuard>> {
    match init_with(Config::test()) {
        Ok(guard) => Ok(Some(guard)),
        Err(LogError::AlreadyInitialized) => Ok(None),
        Err(e) => Err(e),
    }
}
