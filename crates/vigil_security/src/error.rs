//! # Configuration Error Types
//!
//! Raised once, while building engine configuration at startup. Per-event
//! processing is total and never returns these.

use thiserror::Error;
use vigil_core::CoreError;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML or has mistyped keys.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required section is absent.
    #[error("missing required section [{0}]")]
    MissingSection(&'static str),

    /// A baseline range is unusable.
    #[error("invalid baseline for {metric}: {source}")]
    Baseline {
        /// Metric key.
        metric: &'static str,
        /// Underlying construction failure.
        source: CoreError,
    },

    /// Any other out-of-range value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
