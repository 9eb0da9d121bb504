//! Error handling for hoard-log

use thiserror::Error;

/// Logger setup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LogError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filter parsing error
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// Filter string as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("A global logger is already initialized")]
    AlreadyInitialized,
}

/// Result type for logger operations
pub type LogResult<T> = Result<T, LogError>;
