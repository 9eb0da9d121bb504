//! Logger builder implementation

#[macro_use]
mod format;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful initialization
///
/// The global subscriber stays installed for the rest of the process; the
/// guard records what was installed.
#[derive(Debug)]
#[must_use = "the guard describes the installed logger"]
pub struct LoggerGuard {
    level: String,
    format: Format,
}

impl LoggerGuard {
    /// Filter that was installed
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Output format that was installed
    pub fn format(&self) -> Format {
        self.format
    }
}

/// Installs the subscriber, mapping a second installation to an error
macro_rules! init_subscriber {
    ($filter:expr, $fmt_layer:expr) => {
        Registry::default()
            .with($filter)
            .with($fmt_layer)
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global logger
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        if tracing::dispatcher::has_been_set() {
            return Err(LogError::AlreadyInitialized);
        }

        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        let display = &self.config.display;
        match self.config.format {
            Format::Pretty => init_subscriber!(filter, create_fmt_layer!(pretty, display))?,
            Format::Compact => init_subscriber!(filter, create_fmt_layer!(compact, display))?,
            Format::Json => init_subscriber!(filter, create_json_layer!(display))?,
        }

        Ok(LoggerGuard {
            level: self.config.level,
            format: self.config.format,
        })
    }
}
