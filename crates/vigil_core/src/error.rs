//! # Core Error Types
//!
//! Construction-time errors for the shared primitives. Per-event processing
//! never produces these.

use thiserror::Error;

/// Errors raised while building detection primitives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Baseline lower bound exceeds its upper bound.
    #[error("inverted baseline bounds: lower {lower} exceeds upper {upper}")]
    InvertedBounds {
        /// Configured lower bound.
        lower: f64,
        /// Configured upper bound.
        upper: f64,
    },

    /// A numeric parameter was NaN or infinite.
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
}

/// Result type for core construction.
pub type CoreResult<T> = Result<T, CoreError>;
