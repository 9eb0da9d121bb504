//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};

/// Environment variable holding the filter, checked before `RUST_LOG`
pub const LEVEL_ENV: &str = "HOARD_LOG";

/// Environment variable holding the output format
pub const FORMAT_ENV: &str = "HOARD_LOG_FORMAT";

impl Config {
    /// Create configuration from environment variables
    ///
    /// The filter comes from `HOARD_LOG`, then `RUST_LOG`. `HOARD_LOG_FORMAT`
    /// selects the format; unknown values fall back to compact.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(LEVEL_ENV).or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        if let Some(format) = lookup(FORMAT_ENV) {
            config.format = format.parse().unwrap_or(Format::Compact);
        }

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
        }
    }

    /// Test configuration (trace level, no colors)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                ..DisplayConfig::default()
            },
        }
    }
}
