//! Standalone error types for hoard-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use hoard_log::warn;

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Pool Errors ---
    /// No block could be obtained, even after one expansion attempt
    #[error("Memory pool '{type_name}' exhausted (capacity: {capacity} blocks)")]
    PoolExhausted {
        /// Name of the pooled type (or `"raw"` for untyped pools)
        type_name: String,
        /// Total blocks owned by the pool when the request failed
        capacity: usize,
    },

    /// Pointer does not belong to the pool it was handed to
    #[error("Pointer {address:#x} is not owned by this pool")]
    ForeignPointer {
        /// Offending address
        address: usize,
    },

    /// Block is owned by the pool but is already on the free list
    #[error("Block {address:#x} was already returned to the pool")]
    DoubleFree {
        /// Offending address
        address: usize,
    },

    // --- Configuration Errors ---
    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// Arithmetic overflow while sizing a chunk
    #[error("Size overflow during operation: {operation}")]
    SizeOverflow {
        /// Operation that overflowed
        operation: String,
    },

    // --- Reporting Errors ---
    /// Report could not be written
    #[error("Failed to write report to '{path}': {reason}")]
    ReportFailed {
        /// Destination path
        path: String,
        /// Underlying IO error message
        reason: String,
    },
}

impl MemoryError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::ReportFailed { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PoolExhausted { .. } => "MEM:POOL:EXHAUSTED",
            Self::ForeignPointer { .. } => "MEM:POOL:FOREIGN",
            Self::DoubleFree { .. } => "MEM:POOL:DOUBLE_FREE",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::SizeOverflow { .. } => "MEM:CONFIG:OVERFLOW",
            Self::ReportFailed { .. } => "MEM:REPORT:FAILED",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create pool exhausted error
    pub fn pool_exhausted(type_name: &str, capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(pool = type_name, capacity, "Memory pool exhausted");

        Self::PoolExhausted {
            type_name: type_name.to_string(),
            capacity,
        }
    }

    /// Create foreign pointer error
    pub fn foreign_pointer(address: usize) -> Self {
        Self::ForeignPointer { address }
    }

    /// Create double free error
    pub fn double_free(address: usize) -> Self {
        Self::DoubleFree { address }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create report failure error
    pub fn report_failed(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::ReportFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether this error rejects a pointer handed back to a pool
    #[must_use]
    pub fn is_invalid_pointer(&self) -> bool {
        matches!(self, Self::ForeignPointer { .. } | Self::DoubleFree { .. })
    }
}

/// Failure of a fallible in-pool construction.
///
/// Either the pool could not provide a block, or the constructor itself
/// failed. In the latter case the block has already been returned.
#[derive(Error, Debug)]
pub enum CreateError<E> {
    /// The pool could not provide a block
    #[error(transparent)]
    Pool(MemoryError),

    /// The constructor returned an error
    #[error("construction failed: {0}")]
    Construct(E),
}

impl<E> CreateError<E> {
    /// Returns the constructor error, if that is what failed
    pub fn into_construct(self) -> Option<E> {
        match self {
            Self::Construct(e) => Some(e),
            Self::Pool(_) => None,
        }
    }
}

impl<E> From<MemoryError> for CreateError<E> {
    fn from(err: MemoryError) -> Self {
        Self::Pool(err)
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausted_message() {
        let error = MemoryError::pool_exhausted("Particle", 64);
        assert!(error.to_string().contains("Particle"));
        assert!(error.to_string().contains("64"));
    }

    #[test]
    fn test_pointer_errors_show_hex_address() {
        let error = MemoryError::foreign_pointer(0xdead_beef);
        assert!(error.to_string().contains("0xdeadbeef"));
        assert!(error.is_invalid_pointer());
        assert!(MemoryError::double_free(16).is_invalid_pointer());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MemoryError::pool_exhausted("raw", 1).code(),
            "MEM:POOL:EXHAUSTED"
        );
        assert_eq!(MemoryError::foreign_pointer(1).code(), "MEM:POOL:FOREIGN");
        assert_eq!(
            MemoryError::invalid_config("zero block size").code(),
            "MEM:CONFIG:INVALID"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(MemoryError::pool_exhausted("test", 100).is_retryable());
        assert!(!MemoryError::foreign_pointer(8).is_retryable());
    }

    #[test]
    fn test_create_error_split() {
        let err: CreateError<&str> = CreateError::Construct("bad input");
        assert_eq!(err.to_string(), "construction failed: bad input");
        assert_eq!(err.into_construct(), Some("bad input"));

        let err: CreateError<&str> = MemoryError::pool_exhausted("raw", 0).into();
        assert!(err.into_construct().is_none());
    }
}
